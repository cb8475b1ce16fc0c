use super::types::Element;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub element: Element,
    pub position: [f64; 3],
}

impl Atom {
    pub fn new(element: Element, position: [f64; 3]) -> Self {
        Self { element, position }
    }
}
