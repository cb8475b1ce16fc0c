use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid or unsupported element symbol: '{0}'")]
pub struct ParseElementError(String);

/// Elements of the first four periods, addressed by atomic number.
///
/// Variant names are the element symbols, so the serde representation of an
/// element is its symbol (`"C"`, `"Cl"`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Element {
    H = 1,
    He,
    Li,
    Be,
    B,
    C,
    N,
    O,
    F,
    Ne,
    Na,
    Mg,
    Al,
    Si,
    P,
    S,
    Cl,
    Ar,
    K,
    Ca,
    Sc,
    Ti,
    V,
    Cr,
    Mn,
    Fe,
    Co,
    Ni,
    Cu,
    Zn,
    Ga,
    Ge,
    As,
    Se,
    Br,
    Kr = 36,
}

const PERIODIC_TABLE: [(Element, &str); 36] = [
    (Element::H, "H"),
    (Element::He, "He"),
    (Element::Li, "Li"),
    (Element::Be, "Be"),
    (Element::B, "B"),
    (Element::C, "C"),
    (Element::N, "N"),
    (Element::O, "O"),
    (Element::F, "F"),
    (Element::Ne, "Ne"),
    (Element::Na, "Na"),
    (Element::Mg, "Mg"),
    (Element::Al, "Al"),
    (Element::Si, "Si"),
    (Element::P, "P"),
    (Element::S, "S"),
    (Element::Cl, "Cl"),
    (Element::Ar, "Ar"),
    (Element::K, "K"),
    (Element::Ca, "Ca"),
    (Element::Sc, "Sc"),
    (Element::Ti, "Ti"),
    (Element::V, "V"),
    (Element::Cr, "Cr"),
    (Element::Mn, "Mn"),
    (Element::Fe, "Fe"),
    (Element::Co, "Co"),
    (Element::Ni, "Ni"),
    (Element::Cu, "Cu"),
    (Element::Zn, "Zn"),
    (Element::Ga, "Ga"),
    (Element::Ge, "Ge"),
    (Element::As, "As"),
    (Element::Se, "Se"),
    (Element::Br, "Br"),
    (Element::Kr, "Kr"),
];

impl Element {
    #[inline]
    pub fn atomic_number(&self) -> u8 {
        *self as u8
    }

    pub fn symbol(&self) -> &'static str {
        PERIODIC_TABLE[(self.atomic_number() - 1) as usize].1
    }

    /// Looks up an element by atomic number; `None` outside H..Kr.
    pub fn from_atomic_number(z: u8) -> Option<Self> {
        match z {
            1..=36 => Some(PERIODIC_TABLE[(z - 1) as usize].0),
            _ => None,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Element {
    type Err = ParseElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PERIODIC_TABLE
            .iter()
            .find(|(_, symbol)| *symbol == s)
            .map(|(element, _)| *element)
            .ok_or_else(|| ParseElementError(s.to_string()))
    }
}
