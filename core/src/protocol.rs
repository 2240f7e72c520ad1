use crate::error::ModemError;
use crate::FSK_NUM_BINS;

/// Frequency family a protocol transmits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Audible,
    Ultrasound,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::Audible, Family::Ultrasound];

    /// First tone bin of the family's 96-bin band
    pub fn first_bin(self) -> usize {
        match self {
            Family::Audible => 40,
            Family::Ultrasound => 320,
        }
    }

    /// One past the highest tone bin the family uses
    pub fn end_bin(self) -> usize {
        self.first_bin() + FSK_NUM_BINS
    }
}

/// Transmission protocol, numbered the way the host enum numbers them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ProtocolId {
    AudibleNormal = 0,
    AudibleFast = 1,
    AudibleFastest = 2,
    UltrasoundNormal = 3,
    UltrasoundFast = 4,
    UltrasoundFastest = 5,
}

impl ProtocolId {
    pub const ALL: [ProtocolId; 6] = [
        ProtocolId::AudibleNormal,
        ProtocolId::AudibleFast,
        ProtocolId::AudibleFastest,
        ProtocolId::UltrasoundNormal,
        ProtocolId::UltrasoundFast,
        ProtocolId::UltrasoundFastest,
    ];

    pub fn id(self) -> i32 {
        self as i32
    }

    pub fn family(self) -> Family {
        match self {
            ProtocolId::AudibleNormal | ProtocolId::AudibleFast | ProtocolId::AudibleFastest => {
                Family::Audible
            }
            _ => Family::Ultrasound,
        }
    }

    /// Number of tone frames each data symbol lasts
    pub fn frames_per_symbol(self) -> usize {
        match self {
            ProtocolId::AudibleNormal | ProtocolId::UltrasoundNormal => 9,
            ProtocolId::AudibleFast | ProtocolId::UltrasoundFast => 6,
            ProtocolId::AudibleFastest | ProtocolId::UltrasoundFastest => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProtocolId::AudibleNormal => "audible-normal",
            ProtocolId::AudibleFast => "audible-fast",
            ProtocolId::AudibleFastest => "audible-fastest",
            ProtocolId::UltrasoundNormal => "ultrasound-normal",
            ProtocolId::UltrasoundFast => "ultrasound-fast",
            ProtocolId::UltrasoundFastest => "ultrasound-fastest",
        }
    }
}

impl TryFrom<i32> for ProtocolId {
    type Error = ModemError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        ProtocolId::ALL
            .iter()
            .copied()
            .find(|p| p.id() == value)
            .ok_or(ModemError::UnsupportedProtocol(value))
    }
}

impl std::fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_ordered_and_round_trip() {
        for (expected, protocol) in ProtocolId::ALL.iter().enumerate() {
            assert_eq!(protocol.id(), expected as i32);
            assert_eq!(ProtocolId::try_from(protocol.id()).unwrap(), *protocol);
        }
    }

    #[test]
    fn test_unknown_ids_rejected() {
        assert_eq!(
            ProtocolId::try_from(6),
            Err(ModemError::UnsupportedProtocol(6))
        );
        assert!(ProtocolId::try_from(-1).is_err());
    }

    #[test]
    fn test_families_do_not_overlap() {
        assert!(Family::Audible.end_bin() <= Family::Ultrasound.first_bin());
        assert_eq!(ProtocolId::UltrasoundFast.family(), Family::Ultrasound);
        assert_eq!(ProtocolId::AudibleFastest.frames_per_symbol(), 3);
    }
}
