/// Card-side value types and the per-card session state machine

use core::fmt;

use hex_literal::hex;

use super::protocol::commands::PiccCommand;

/// Answer To Request, as received (LSB first on the air)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtqA(pub [u8; 2]);

impl AtqA {
    /// Card type code as the two reply bytes read big-endian
    pub fn code(&self) -> u16 {
        u16::from_be_bytes(self.0)
    }

    pub fn card_type(&self) -> CardType {
        CardType::from_code(self.code())
    }
}

/// Card families identified from the ATQA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardType {
    MifareUltralight,
    MifareOneS50,
    MifareOneS70,
    MifarePro,
    MifareDesfire,
    Unknown(u16),
}

impl CardType {
    pub fn from_code(code: u16) -> Self {
        match code {
            0x4400 => Self::MifareUltralight,
            0x0400 => Self::MifareOneS50,
            0x0200 => Self::MifareOneS70,
            0x0800 => Self::MifarePro,
            0x4403 => Self::MifareDesfire,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MifareUltralight => write!(f, "MIFARE Ultralight"),
            Self::MifareOneS50 => write!(f, "MIFARE One S50 (1K)"),
            Self::MifareOneS70 => write!(f, "MIFARE One S70 (4K)"),
            Self::MifarePro => write!(f, "MIFARE Pro(X)"),
            Self::MifareDesfire => write!(f, "MIFARE DESFire"),
            Self::Unknown(code) => write!(f, "unknown ({code:#06X})"),
        }
    }
}

/// Cascade level 1 UID (single size, 4 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uid(pub [u8; 4]);

impl Uid {
    pub fn bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Block check character: XOR of the UID bytes
    pub fn bcc(&self) -> u8 {
        self.0.iter().fold(0, |acc, b| acc ^ b)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

/// Select Acknowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sak(pub u8);

impl Sak {
    /// Bit 2: UID not complete, another cascade level follows
    pub fn is_uid_incomplete(&self) -> bool {
        self.0 & 0x04 != 0
    }

    /// Bit 5: card is ISO/IEC 14443-4 compliant
    pub fn supports_iso14443_4(&self) -> bool {
        self.0 & 0x20 != 0
    }
}

/// MIFARE Classic sector key
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Key(pub [u8; 6]);

impl Key {
    /// Transport key shipped on blank cards
    pub const DEFAULT: Key = Key(hex!("FFFFFFFFFFFF"));

    pub fn bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl Default for Key {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// Keys stay out of logs
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(..)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    #[default]
    A,
    B,
}

impl KeyType {
    pub fn command(self) -> PiccCommand {
        match self {
            Self::A => PiccCommand::AuthKeyA,
            Self::B => PiccCommand::AuthKeyB,
        }
    }
}

/// Everything learned while activating a card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Card {
    pub atqa: AtqA,
    pub uid: Uid,
    pub sak: Sak,
}

impl Card {
    pub fn card_type(&self) -> CardType {
        self.atqa.card_type()
    }
}

/// Sector holding `block`: 4 blocks per sector below block 128, 16 above (4K cards)
pub fn sector_of(block: u8) -> u8 {
    if block < 128 {
        block / 4
    } else {
        32 + (block - 128) / 16
    }
}

/// Last block of every sector holds the keys and access bits
pub fn is_sector_trailer(block: u8) -> bool {
    if block < 128 {
        block % 4 == 3
    } else {
        (block - 128) % 16 == 15
    }
}

/// Where the card stands in the activation sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardState {
    #[default]
    Idle,
    Requested,
    Anticollided,
    Selected,
    Authenticated { sector: u8 },
}

/// Per-card state carried between operations.
///
/// Each step of Request → Anticollision → Select → Authenticate records its
/// result here and the next step checks it as a precondition. Any failure drops
/// the session back to [`CardState::Idle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CardSession {
    state: CardState,
    atqa: Option<AtqA>,
    uid: Option<Uid>,
    sak: Option<Sak>,
}

impl CardSession {
    pub fn state(&self) -> CardState {
        self.state
    }

    pub fn atqa(&self) -> Option<AtqA> {
        self.atqa
    }

    pub fn card_type(&self) -> Option<CardType> {
        self.atqa.map(|a| a.card_type())
    }

    pub fn uid(&self) -> Option<Uid> {
        self.uid
    }

    pub fn sak(&self) -> Option<Sak> {
        self.sak
    }

    /// Authenticated for the sector covering `block`
    pub fn is_authenticated_for(&self, block: u8) -> bool {
        matches!(self.state, CardState::Authenticated { sector } if sector == sector_of(block))
    }

    pub(crate) fn requested(&mut self, atqa: AtqA) {
        *self = Self {
            state: CardState::Requested,
            atqa: Some(atqa),
            ..Self::default()
        };
    }

    pub(crate) fn anticollided(&mut self, uid: Uid) {
        self.state = CardState::Anticollided;
        self.uid = Some(uid);
    }

    pub(crate) fn selected(&mut self, uid: Uid, sak: Sak) {
        self.state = CardState::Selected;
        self.uid = Some(uid);
        self.sak = Some(sak);
    }

    pub(crate) fn authenticated(&mut self, sector: u8) {
        self.state = CardState::Authenticated { sector };
    }

    /// Crypto1 switched off, card still selected
    pub(crate) fn deauthenticated(&mut self) {
        if matches!(self.state, CardState::Authenticated { .. }) {
            self.state = CardState::Selected;
        }
    }

    pub(crate) fn invalidate(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_type_from_atqa() {
        assert_eq!(AtqA([0x04, 0x00]).card_type(), CardType::MifareOneS50);
        assert_eq!(AtqA([0x02, 0x00]).card_type(), CardType::MifareOneS70);
        assert_eq!(AtqA([0x44, 0x00]).card_type(), CardType::MifareUltralight);
        assert_eq!(AtqA([0x08, 0x00]).card_type(), CardType::MifarePro);
        assert_eq!(AtqA([0x44, 0x03]).card_type(), CardType::MifareDesfire);
        assert_eq!(AtqA([0x12, 0x34]).card_type(), CardType::Unknown(0x1234));
    }

    #[test]
    fn test_uid_bcc_and_display() {
        let uid = Uid([0x12, 0x34, 0x56, 0x78]);
        assert_eq!(uid.bcc(), 0x12 ^ 0x34 ^ 0x56 ^ 0x78);
        assert_eq!(uid.to_string(), "12345678");
    }

    #[test]
    fn test_sector_math() {
        assert_eq!(sector_of(0), 0);
        assert_eq!(sector_of(8), 2);
        assert_eq!(sector_of(11), 2);
        assert_eq!(sector_of(63), 15);
        assert_eq!(sector_of(127), 31);
        assert_eq!(sector_of(128), 32);
        assert_eq!(sector_of(255), 39);

        assert!(is_sector_trailer(3));
        assert!(is_sector_trailer(11));
        assert!(!is_sector_trailer(8));
        assert!(is_sector_trailer(143));
        assert!(!is_sector_trailer(131));
    }

    #[test]
    fn test_session_transitions() {
        let mut session = CardSession::default();
        assert_eq!(session.state(), CardState::Idle);

        session.requested(AtqA([0x04, 0x00]));
        assert_eq!(session.card_type(), Some(CardType::MifareOneS50));

        let uid = Uid([1, 2, 3, 4]);
        session.anticollided(uid);
        session.selected(uid, Sak(0x08));
        session.authenticated(2);
        assert!(session.is_authenticated_for(8));
        assert!(session.is_authenticated_for(11));
        assert!(!session.is_authenticated_for(12));

        session.deauthenticated();
        assert_eq!(session.state(), CardState::Selected);
        assert_eq!(session.uid(), Some(uid));

        session.invalidate();
        assert_eq!(session, CardSession::default());
    }

    #[test]
    fn test_new_request_forgets_previous_card() {
        let mut session = CardSession::default();
        session.requested(AtqA([0x04, 0x00]));
        session.selected(Uid([1, 2, 3, 4]), Sak(0x08));
        session.requested(AtqA([0x44, 0x00]));
        assert_eq!(session.uid(), None);
        assert_eq!(session.sak(), None);
    }

    #[test]
    fn test_key_debug_is_redacted() {
        assert_eq!(format!("{:?}", Key::DEFAULT), "Key(..)");
        assert_eq!(Key::default().bytes(), &[0xFF; 6]);
    }
}
