//! Power switches addressed by PDU and switch commands.

use std::fmt;
use std::str::FromStr;

/// Switch identifiers as numbered on the PDU wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Switch {
    None = 0,
    All = 1,
    Rail3v3A = 2,
    Rail3v3B = 3,
    Rail5vA = 4,
    Rail5vB = 5,
    Rail5vC = 6,
    Rail5vD = 7,
    Rail12v = 8,
    Vbatt = 9,
    Watchdog = 10,
    Hbridge1 = 11,
    Hbridge2 = 12,
    Burn = 13,
    Burn1 = 14,
    Burn2 = 15,
    Companion = 16,
}

/// Switches reported by a telemetry reply, in wire order.
pub const TELEMETRY_SWITCHES: [Switch; 12] = [
    Switch::Rail3v3A,
    Switch::Rail3v3B,
    Switch::Rail5vA,
    Switch::Rail5vB,
    Switch::Rail5vC,
    Switch::Rail5vD,
    Switch::Rail12v,
    Switch::Vbatt,
    Switch::Watchdog,
    Switch::Hbridge1,
    Switch::Hbridge2,
    Switch::Burn,
];

/// Number of physical switches behind the PDU (`Rail3v3A` through `Burn2`).
pub const PHYSICAL_SWITCHES: usize = 14;

impl Switch {
    /// Battery heater supply.
    pub const HEATER: Switch = Switch::Rail5vB;

    /// Deployment burn wire.
    pub const BURN_WIRE: Switch = Switch::Burn1;

    const ALL: [Switch; 17] = [
        Switch::None,
        Switch::All,
        Switch::Rail3v3A,
        Switch::Rail3v3B,
        Switch::Rail5vA,
        Switch::Rail5vB,
        Switch::Rail5vC,
        Switch::Rail5vD,
        Switch::Rail12v,
        Switch::Vbatt,
        Switch::Watchdog,
        Switch::Hbridge1,
        Switch::Hbridge2,
        Switch::Burn,
        Switch::Burn1,
        Switch::Burn2,
        Switch::Companion,
    ];

    pub fn from_id(id: u8) -> Option<Switch> {
        Self::ALL.get(usize::from(id)).copied()
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Switch::None => "none",
            Switch::All => "all",
            Switch::Rail3v3A => "3v3_1",
            Switch::Rail3v3B => "3v3_2",
            Switch::Rail5vA => "5v_1",
            Switch::Rail5vB => "5v_2",
            Switch::Rail5vC => "5v_3",
            Switch::Rail5vD => "5v_4",
            Switch::Rail12v => "12v",
            Switch::Vbatt => "vbatt",
            Switch::Watchdog => "wdt",
            Switch::Hbridge1 => "hbridge1",
            Switch::Hbridge2 => "hbridge2",
            Switch::Burn => "burn",
            Switch::Burn1 => "burn1",
            Switch::Burn2 => "burn2",
            Switch::Companion => "rpi",
        }
    }

    /// Position in the PDU switch-state cache, for physical PDU switches.
    ///
    /// Slots follow the enumeration from the first rail, so `Rail3v3A` is
    /// slot 0 and `Burn2` is the last. `None`, `All` and `Companion` are not
    /// PDU switches and have no slot.
    pub fn cache_slot(self) -> Option<usize> {
        let first = Switch::Rail3v3A.id();
        let last = Switch::Burn2.id();
        (first..=last)
            .contains(&self.id())
            .then(|| usize::from(self.id() - first))
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Switch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        if lowered == "companion" {
            return Ok(Switch::Companion);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|sw| sw.name() == lowered)
            .or_else(|| s.parse::<u8>().ok().and_then(Switch::from_id))
            .ok_or_else(|| format!("unknown switch: {s}"))
    }
}

/// Commanded or reported switch position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SwitchState {
    Off = 0,
    On = 1,
}

impl SwitchState {
    pub fn from_u8(value: u8) -> Option<SwitchState> {
        match value {
            0 => Some(SwitchState::Off),
            1 => Some(SwitchState::On),
            _ => None,
        }
    }

    pub fn is_on(self) -> bool {
        self == SwitchState::On
    }
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SwitchState::Off => "off",
            SwitchState::On => "on",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_roundtrip_through_enumeration() {
        for id in 0..=16u8 {
            assert_eq!(Switch::from_id(id).unwrap().id(), id);
        }
        assert_eq!(Switch::from_id(17), None);
    }

    #[test]
    fn cache_slots_cover_physical_switches_only() {
        assert_eq!(Switch::Rail3v3A.cache_slot(), Some(0));
        assert_eq!(Switch::Burn.cache_slot(), Some(11));
        assert_eq!(Switch::Burn1.cache_slot(), Some(12));
        assert_eq!(Switch::Burn2.cache_slot(), Some(PHYSICAL_SWITCHES - 1));
        assert_eq!(Switch::None.cache_slot(), None);
        assert_eq!(Switch::All.cache_slot(), None);
        assert_eq!(Switch::Companion.cache_slot(), None);
    }

    #[test]
    fn telemetry_order_matches_cache_slots() {
        for (index, sw) in TELEMETRY_SWITCHES.iter().enumerate() {
            assert_eq!(sw.cache_slot(), Some(index));
        }
    }

    #[test]
    fn names_parse_back() {
        assert_eq!("5v_2".parse::<Switch>().unwrap(), Switch::HEATER);
        assert_eq!("BURN1".parse::<Switch>().unwrap(), Switch::BURN_WIRE);
        assert_eq!("companion".parse::<Switch>().unwrap(), Switch::Companion);
        assert_eq!("rpi".parse::<Switch>().unwrap(), Switch::Companion);
        assert_eq!("8".parse::<Switch>().unwrap(), Switch::Rail12v);
        assert!("6v".parse::<Switch>().is_err());
    }

    #[test]
    fn states_decode_strictly() {
        assert_eq!(SwitchState::from_u8(1), Some(SwitchState::On));
        assert_eq!(SwitchState::from_u8(0), Some(SwitchState::Off));
        assert_eq!(SwitchState::from_u8(2), None);
        assert_eq!(SwitchState::from(true), SwitchState::On);
    }
}
