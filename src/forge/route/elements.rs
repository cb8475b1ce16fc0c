use crate::forge::error::Error;
use crate::model::types::Element;

/// The fixed set of elements a model accepts, with dense category indices.
///
/// Elements are kept sorted by atomic number; the category of an element is
/// its position in that order. Ordered pairs `(a, b)` use
/// `category(a) * len + category(b)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSet {
    elements: Vec<Element>,
    lookup: [Option<u8>; 256],
}

impl ElementSet {
    /// Creates an element set from atomic numbers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchitecture`] if the list is empty, contains
    /// duplicates, or names an unsupported atomic number.
    pub fn new(atomic_numbers: &[u8]) -> Result<Self, Error> {
        if atomic_numbers.is_empty() {
            return Err(Error::InvalidArchitecture(
                "at least one element is required".to_string(),
            ));
        }

        let mut elements = atomic_numbers
            .iter()
            .map(|&z| {
                Element::from_atomic_number(z).ok_or_else(|| {
                    Error::InvalidArchitecture(format!("unsupported atomic number {}", z))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        elements.sort();

        let before = elements.len();
        elements.dedup();
        if elements.len() != before {
            return Err(Error::InvalidArchitecture(format!(
                "duplicate elements in {:?}",
                atomic_numbers
            )));
        }

        let mut lookup = [None; 256];
        for (category, element) in elements.iter().enumerate() {
            lookup[element.atomic_number() as usize] = Some(category as u8);
        }

        Ok(Self { elements, lookup })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn atomic_numbers(&self) -> Vec<u8> {
        self.elements.iter().map(Element::atomic_number).collect()
    }

    /// Dense category of an atomic number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCategory`] if the element is not in the set.
    #[inline]
    pub fn category(&self, code: u8) -> Result<usize, Error> {
        self.lookup[code as usize]
            .map(usize::from)
            .ok_or(Error::UnknownCategory {
                code: i64::from(code),
            })
    }

    /// Dense category of the ordered pair `(a, b)`.
    #[inline]
    pub fn pair_category(&self, a: u8, b: u8) -> Result<usize, Error> {
        Ok(self.category(a)? * self.len() + self.category(b)?)
    }

    /// Number of ordered pair categories.
    #[inline]
    pub fn pair_count(&self) -> usize {
        self.len() * self.len()
    }

    /// Element symbols in category order (`"H"`, `"C"`, ...).
    pub fn symbols(&self) -> impl Iterator<Item = String> + '_ {
        self.elements.iter().map(|e| e.symbol().to_string())
    }

    /// Concatenated pair symbols in pair-category order (`"HH"`, `"HC"`, ...).
    pub fn pair_symbols(&self) -> impl Iterator<Item = String> + '_ {
        self.elements.iter().flat_map(move |a| {
            self.elements
                .iter()
                .map(move |b| format!("{}{}", a.symbol(), b.symbol()))
        })
    }
}
