//! Tiler-space address conversion. Rotation and mirroring are accepted and
//! encoded into the returned address exactly as the hardware expects; this
//! crate performs no pixel manipulation of its own — the TILER engine reads
//! tiles through whichever orientation the address encodes.

use crate::types::{SsPtr, TilerSpacePtr};

/// Rotation applied by the TILER hardware on read, in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    fn bits(self) -> u64 {
        match self {
            Rotation::None => 0b00,
            Rotation::Deg90 => 0b01,
            Rotation::Deg180 => 0b10,
            Rotation::Deg270 => 0b11,
        }
    }
}

bitflags::bitflags! {
    /// Horizontal/vertical mirroring flags, combinable with a [`Rotation`].
    pub struct Mirroring: u8 {
        const HORIZONTAL = 0b01;
        const VERTICAL   = 0b10;
    }
}

/// The corner of the buffer that the tiler-space address points at, given
/// the orientation it was converted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefCorner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Encodes `(rotation, mirroring)` into the reference corner the hardware
/// will read from, mirroring the redundancy noted in the original header:
/// 180-degree rotation and horizontal+vertical mirroring are equivalent.
pub fn ref_corner_for(rotation: Rotation, mirroring: Mirroring) -> RefCorner {
    let horiz = mirroring.contains(Mirroring::HORIZONTAL);
    let vert = mirroring.contains(Mirroring::VERTICAL);
    match (rotation, horiz, vert) {
        (Rotation::None, false, false) => RefCorner::TopLeft,
        (Rotation::None, true, false) | (Rotation::Deg180, false, true) => RefCorner::TopRight,
        (Rotation::None, false, true) | (Rotation::Deg180, true, false) => RefCorner::BottomLeft,
        (Rotation::Deg180, false, false) | (Rotation::None, true, true) => RefCorner::BottomRight,
        (Rotation::Deg90, false, false) => RefCorner::TopRight,
        (Rotation::Deg90, _, _) => RefCorner::BottomRight,
        (Rotation::Deg270, false, false) => RefCorner::BottomLeft,
        (Rotation::Deg270, _, _) => RefCorner::TopLeft,
        (Rotation::Deg180, true, true) => RefCorner::TopLeft,
    }
}

/// The 33rd (implied) bit of tiler-space addressing; set on every
/// non-null conversion to distinguish a tiler-space address from a plain
/// 32-bit system-space one.
const TILER_SPACE_BASE: u64 = 1 << 32;

/// Converts a system-space pointer to its tiler-space equivalent under the
/// given orientation. A null `ssptr` converts to a null `TSPtr`, matching
/// `convertToTilerSpace`'s documented behavior.
pub fn to_tiler_space(ssptr: SsPtr, rotation: Rotation, mirroring: Mirroring) -> Option<TilerSpacePtr> {
    if ssptr.is_null() {
        return None;
    }
    let orientation = (rotation.bits() << 2) | mirroring.bits() as u64;
    Some(TilerSpacePtr(
        TILER_SPACE_BASE | ((ssptr.addr() as u64) & 0xFFFF_FFFF) | (orientation << 40),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pointer_converts_to_none() {
        assert!(to_tiler_space(SsPtr::NULL, Rotation::None, Mirroring::empty()).is_none());
    }

    #[test]
    fn non_null_pointer_sets_implied_bit() {
        let ts = to_tiler_space(SsPtr(0x4000), Rotation::None, Mirroring::empty()).unwrap();
        assert_eq!(ts.addr() & TILER_SPACE_BASE, TILER_SPACE_BASE);
        assert_eq!(ts.addr() & 0xFFFF_FFFF, 0x4000);
    }

    #[test]
    fn rotation_180_matches_hv_mirroring() {
        assert_eq!(
            ref_corner_for(Rotation::Deg180, Mirroring::empty()),
            ref_corner_for(Rotation::None, Mirroring::HORIZONTAL | Mirroring::VERTICAL),
        );
    }

    #[test]
    fn identity_orientation_is_top_left() {
        assert_eq!(ref_corner_for(Rotation::None, Mirroring::empty()), RefCorner::TopLeft);
    }
}
