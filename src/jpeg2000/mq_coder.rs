//! MQ Arithmetic Coder (ISO/IEC 15444-1 Annex C)
//!
//! `MqEncoder` and `MqDecoder` each own their interval registers and context
//! table; nothing is shared between instances.

// Standard Table C.2: (Qe, NMPS, NLPS, SWITCH)
const MQ_TABLE: [(u32, u8, u8, u8); 47] = [
    (0x5601, 1, 1, 1),
    (0x3401, 2, 6, 0),
    (0x1801, 3, 9, 0),
    (0x0AC1, 4, 12, 0),
    (0x0521, 5, 29, 0),
    (0x0221, 38, 33, 0),
    (0x5601, 7, 6, 1),
    (0x5401, 8, 14, 0),
    (0x4801, 9, 14, 0),
    (0x3801, 10, 14, 0),
    (0x3001, 11, 17, 0),
    (0x2401, 12, 18, 0),
    (0x1C01, 13, 20, 0),
    (0x1601, 29, 21, 0),
    (0x5601, 15, 14, 1),
    (0x5401, 16, 14, 0),
    (0x5101, 17, 15, 0),
    (0x4801, 18, 16, 0),
    (0x3801, 19, 17, 0),
    (0x3401, 20, 18, 0),
    (0x3001, 21, 19, 0),
    (0x2801, 22, 19, 0),
    (0x2401, 23, 19, 0),
    (0x2201, 24, 19, 0),
    (0x1C01, 25, 20, 0),
    (0x1801, 26, 21, 0),
    (0x1601, 27, 22, 0),
    (0x1401, 28, 23, 0),
    (0x1201, 29, 24, 0),
    (0x1101, 30, 25, 0),
    (0x0AC1, 31, 26, 0),
    (0x09C1, 32, 27, 0),
    (0x08A1, 33, 28, 0),
    (0x0521, 34, 29, 0),
    (0x0441, 35, 30, 0),
    (0x02A1, 36, 31, 0),
    (0x0221, 37, 32, 0),
    (0x0141, 38, 33, 0),
    (0x0111, 39, 34, 0),
    (0x0085, 40, 35, 0),
    (0x0049, 41, 36, 0),
    (0x0025, 42, 37, 0),
    (0x0015, 43, 38, 0),
    (0x0009, 44, 39, 0),
    (0x0005, 45, 40, 0),
    (0x0001, 45, 41, 0),
    (0x5601, 46, 46, 0),
];

/// Probability state of one coding context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MqContext {
    pub index: u8,
    pub mps: u8,
}

impl MqContext {
    fn qe(self) -> u32 {
        MQ_TABLE[self.index as usize].0
    }

    fn on_mps(&mut self) {
        self.index = MQ_TABLE[self.index as usize].1;
    }

    fn on_lps(&mut self) {
        let (_, _, nlps, switch) = MQ_TABLE[self.index as usize];
        if switch == 1 {
            self.mps ^= 1;
        }
        self.index = nlps;
    }
}

pub struct MqEncoder {
    a: u32,
    c: u32,
    ct: u32,
    // buffer[0] stands in for the byte preceding the codeword; it absorbs
    // nothing but keeps BYTEOUT free of special cases.
    buffer: Vec<u8>,
    contexts: Vec<MqContext>,
}

impl MqEncoder {
    pub fn new(context_count: usize) -> Self {
        Self {
            a: 0x8000,
            c: 0,
            ct: 12,
            buffer: vec![0],
            contexts: vec![MqContext::default(); context_count],
        }
    }

    pub fn set_context(&mut self, cx: usize, index: u8, mps: u8) {
        self.contexts[cx] = MqContext { index, mps };
    }

    pub fn context(&self, cx: usize) -> MqContext {
        self.contexts[cx]
    }

    /// Codes `bit` in context `cx` (CODEMPS / CODELPS).
    pub fn encode(&mut self, cx: usize, bit: u8) {
        let ctx = &mut self.contexts[cx];
        let qe = ctx.qe();
        self.a -= qe;
        if bit == ctx.mps {
            if self.a & 0x8000 == 0 {
                if self.a < qe {
                    self.a = qe;
                } else {
                    self.c += qe;
                }
                ctx.on_mps();
                self.renormalize();
            } else {
                self.c += qe;
            }
        } else {
            if self.a < qe {
                self.c += qe;
            } else {
                self.a = qe;
            }
            ctx.on_lps();
            self.renormalize();
        }
    }

    fn renormalize(&mut self) {
        loop {
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.ct == 0 {
                self.byte_out();
            }
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    fn byte_out(&mut self) {
        let last = self.buffer.len() - 1;
        if self.buffer[last] == 0xFF {
            self.emit_seven_bits();
        } else if self.c < 0x800_0000 {
            self.emit_eight_bits();
        } else {
            // Carry into the previous byte.
            self.buffer[last] = self.buffer[last].wrapping_add(1);
            if self.buffer[last] == 0xFF {
                self.c &= 0x7FF_FFFF;
                self.emit_seven_bits();
            } else {
                self.emit_eight_bits();
            }
        }
    }

    fn emit_seven_bits(&mut self) {
        self.buffer.push((self.c >> 20) as u8);
        self.c &= 0xF_FFFF;
        self.ct = 7;
    }

    fn emit_eight_bits(&mut self) {
        self.buffer.push((self.c >> 19) as u8);
        self.c &= 0x7_FFFF;
        self.ct = 8;
    }

    /// Bytes produced so far, including the byte still open for carries.
    pub fn num_bytes(&self) -> usize {
        self.buffer.len() - 1
    }

    /// Terminates the codeword (FLUSH with SETBITS) and returns it. A final
    /// 0xFF is dropped; decoders synthesise it past the end of data.
    pub fn flush(mut self) -> Vec<u8> {
        let temp = self.c + self.a;
        self.c |= 0xFFFF;
        if self.c >= temp {
            self.c -= 0x8000;
        }
        self.c <<= self.ct;
        self.byte_out();
        self.c <<= self.ct;
        self.byte_out();

        if self.buffer.len() > 1 && self.buffer.last() == Some(&0xFF) {
            self.buffer.pop();
        }
        self.buffer.remove(0);
        self.buffer
    }
}

pub struct MqDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    a: u32,
    c: u32,
    ct: u32,
    contexts: Vec<MqContext>,
}

impl<'a> MqDecoder<'a> {
    /// INITDEC over `data`.
    pub fn new(data: &'a [u8], context_count: usize) -> Self {
        let mut decoder = Self {
            data,
            pos: 0,
            a: 0x8000,
            c: (data.first().copied().unwrap_or(0xFF) as u32) << 16,
            ct: 0,
            contexts: vec![MqContext::default(); context_count],
        };
        decoder.byte_in();
        decoder.c <<= 7;
        decoder.ct = decoder.ct.saturating_sub(7);
        decoder
    }

    pub fn set_context(&mut self, cx: usize, index: u8, mps: u8) {
        self.contexts[cx] = MqContext { index, mps };
    }

    /// BYTEIN. Past the end of data the decoder behaves as if it read 0xFF
    /// bytes followed by a marker, which yields deterministic filler bits.
    fn byte_in(&mut self) {
        if self.pos >= self.data.len() {
            self.c = self.c.wrapping_add(0xFF00);
            self.ct = 8;
            return;
        }
        let next = self.data.get(self.pos + 1).copied().unwrap_or(0xFF) as u32;
        if self.data[self.pos] == 0xFF {
            if next > 0x8F {
                self.c = self.c.wrapping_add(0xFF00);
                self.ct = 8;
            } else {
                self.pos += 1;
                self.c = self.c.wrapping_add(next << 9);
                self.ct = 7;
            }
        } else {
            self.pos += 1;
            self.c = self.c.wrapping_add(next << 8);
            self.ct = 8;
        }
    }

    pub fn decode(&mut self, cx: usize) -> u8 {
        let mut ctx = self.contexts[cx];
        let qe = ctx.qe();
        self.a -= qe;
        let bit;
        if (self.c >> 16) < qe {
            // LPS sub-interval, unless the conditional exchange applies.
            if self.a < qe {
                bit = ctx.mps;
                ctx.on_mps();
            } else {
                bit = 1 - ctx.mps;
                ctx.on_lps();
            }
            self.a = qe;
            self.contexts[cx] = ctx;
            self.renormalize();
        } else {
            self.c -= qe << 16;
            if self.a & 0x8000 == 0 {
                if self.a < qe {
                    bit = 1 - ctx.mps;
                    ctx.on_lps();
                } else {
                    bit = ctx.mps;
                    ctx.on_mps();
                }
                self.contexts[cx] = ctx;
                self.renormalize();
            } else {
                bit = ctx.mps;
            }
        }
        bit
    }

    fn renormalize(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_in();
            }
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(ops: &[(usize, u8)], context_count: usize) -> Vec<u8> {
        let mut encoder = MqEncoder::new(context_count);
        for &(cx, bit) in ops {
            encoder.encode(cx, bit);
        }
        let encoded = encoder.flush();
        let mut decoder = MqDecoder::new(&encoded, context_count);
        ops.iter().map(|&(cx, _)| decoder.decode(cx)).collect()
    }

    #[test]
    fn test_mq_encode_decode_roundtrip() {
        let bits: Vec<u8> = vec![0, 0, 1, 0, 1, 1, 0, 1, 0, 0];
        let ops: Vec<_> = bits.iter().map(|&b| (0, b)).collect();
        assert_eq!(roundtrip(&ops, 1), bits);
    }

    #[test]
    fn test_mq_multi_context_roundtrip() {
        let mut rng = fastrand::Rng::with_seed(7);
        let ops: Vec<(usize, u8)> = (0..5000)
            .map(|i| {
                let cx = rng.usize(0..19);
                // Skewed sources in some contexts, uniform in others.
                let bit = if cx % 3 == 0 {
                    (rng.u8(0..10) == 0) as u8
                } else {
                    ((i * 7 + cx) % 2) as u8
                };
                (cx, bit)
            })
            .collect();
        let decoded = roundtrip(&ops, 19);
        let expected: Vec<u8> = ops.iter().map(|&(_, b)| b).collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_mq_initial_states_roundtrip() {
        let ops = [(17, 0), (17, 0), (17, 1), (18, 1), (18, 0), (0, 1), (17, 0)];
        let mut encoder = MqEncoder::new(19);
        encoder.set_context(0, 4, 0);
        encoder.set_context(17, 3, 0);
        encoder.set_context(18, 46, 0);
        for &(cx, bit) in &ops {
            encoder.encode(cx, bit);
        }
        let encoded = encoder.flush();

        let mut decoder = MqDecoder::new(&encoded, 19);
        decoder.set_context(0, 4, 0);
        decoder.set_context(17, 3, 0);
        decoder.set_context(18, 46, 0);
        for &(cx, bit) in &ops {
            assert_eq!(decoder.decode(cx), bit);
        }
    }

    #[test]
    fn test_mq_liveness_long_sequences() {
        for len in [1usize, 2, 17, 255, 1000, 1500] {
            let bits: Vec<u8> = (0..len).map(|i| ((i * 31 + len) % 5 == 0) as u8).collect();
            let mut encoder = MqEncoder::new(1);
            for &b in &bits {
                encoder.encode(0, b);
            }
            let encoded = encoder.flush();
            assert!(!encoded.is_empty());

            let mut decoder = MqDecoder::new(&encoded, 1);
            let decoded: Vec<u8> = (0..len).map(|_| decoder.decode(0)).collect();
            assert!(decoded.iter().all(|&b| b <= 1));
            assert_eq!(decoded, bits);
        }
    }

    #[test]
    fn test_mq_decode_past_end_is_deterministic() {
        let mut first = MqDecoder::new(&[0x12, 0xFF], 2);
        let mut second = MqDecoder::new(&[0x12, 0xFF], 2);
        for i in 0..2000 {
            let a = first.decode(i % 2);
            let b = second.decode(i % 2);
            assert!(a <= 1);
            assert_eq!(a, b);
        }
        let mut empty = MqDecoder::new(&[], 1);
        for _ in 0..100 {
            assert!(empty.decode(0) <= 1);
        }
    }

    #[test]
    fn test_mq_all_ones_produce_no_marker() {
        let mut encoder = MqEncoder::new(1);
        for _ in 0..4096 {
            encoder.encode(0, 1);
        }
        let encoded = encoder.flush();
        for pair in encoded.windows(2) {
            assert!(!(pair[0] == 0xFF && pair[1] > 0x8F));
        }
    }
}
