//! Packet progression orders (ISO/IEC 15444-1 B.12).
//!
//! With a single precinct per resolution the position axis collapses, so
//! each order reduces to a nesting of layer, resolution and component.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Progression order as signalled in the COD marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ProgressionOrder {
    /// Layer-resolution-component-position
    #[default]
    Lrcp = 0,
    /// Resolution-layer-component-position
    Rlcp = 1,
    /// Resolution-position-component-layer
    Rpcl = 2,
    /// Position-component-resolution-layer
    Pcrl = 3,
    /// Component-position-resolution-layer
    Cprl = 4,
}

impl ProgressionOrder {
    pub const ALL: [ProgressionOrder; 5] = [
        Self::Lrcp,
        Self::Rlcp,
        Self::Rpcl,
        Self::Pcrl,
        Self::Cprl,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Lrcp => "LRCP",
            Self::Rlcp => "RLCP",
            Self::Rpcl => "RPCL",
            Self::Pcrl => "PCRL",
            Self::Cprl => "CPRL",
        }
    }
}

/// One packet slot in a tile's codestream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketId {
    pub layer: u16,
    pub resolution: u8,
    pub component: u16,
}

/// Packet order of a tile. `resolutions[c]` is the number of resolution
/// levels of component `c`; components with fewer levels are skipped where
/// the resolution does not exist.
pub fn packet_sequence(order: ProgressionOrder, layers: u16, resolutions: &[u8]) -> Vec<PacketId> {
    let max_resolutions = resolutions.iter().copied().max().unwrap_or(0);
    let components = resolutions.len() as u16;
    let capacity = layers as usize * resolutions.iter().map(|&r| r as usize).sum::<usize>();
    let mut sequence = Vec::with_capacity(capacity);

    let mut push = |layer: u16, resolution: u8, component: u16| {
        if resolution < resolutions[component as usize] {
            sequence.push(PacketId {
                layer,
                resolution,
                component,
            });
        }
    };

    match order {
        ProgressionOrder::Lrcp => {
            for l in 0..layers {
                for r in 0..max_resolutions {
                    for c in 0..components {
                        push(l, r, c);
                    }
                }
            }
        }
        ProgressionOrder::Rlcp => {
            for r in 0..max_resolutions {
                for l in 0..layers {
                    for c in 0..components {
                        push(l, r, c);
                    }
                }
            }
        }
        ProgressionOrder::Rpcl => {
            for r in 0..max_resolutions {
                for c in 0..components {
                    for l in 0..layers {
                        push(l, r, c);
                    }
                }
            }
        }
        ProgressionOrder::Pcrl | ProgressionOrder::Cprl => {
            for c in 0..components {
                for r in 0..max_resolutions {
                    for l in 0..layers {
                        push(l, r, c);
                    }
                }
            }
        }
    }
    sequence
}
