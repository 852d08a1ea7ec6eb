use super::error::Error;
use crate::model::types::Element;
use serde::Deserialize;
use std::sync::OnceLock;

const REFERENCE_TOML: &str = include_str!("../../resources/reference.toml");
const DAMPING_TOML: &str = include_str!("../../resources/damping.toml");

static REFERENCE_DATA: OnceLock<ReferenceData> = OnceLock::new();
static DAMPING_TABLE: OnceLock<DampingTable> = OnceLock::new();

/// Conversion factor from Ångström to Bohr.
pub const AATOAU: f64 = 1.0 / 0.529_177_210_903;

/// Imaginary frequencies (Hartree) of the Casimir-Polder quadrature grid.
pub const FREQUENCIES: [f64; 23] = [
    0.000001, 0.050000, 0.100000, 0.200000, 0.300000, 0.400000, 0.500000, 0.600000, 0.700000,
    0.800000, 0.900000, 1.000000, 1.200000, 1.400000, 1.600000, 1.800000, 2.000000, 2.500000,
    3.000000, 4.000000, 5.000000, 7.500000, 10.00000,
];

/// Number of points on the imaginary frequency grid.
pub const NFREQ: usize = FREQUENCIES.len();

#[derive(Debug, Deserialize)]
struct RawReferenceFile {
    elements: Vec<RawElement>,
}

#[derive(Debug, Deserialize)]
struct RawElement {
    symbol: String,
    atomic_number: u8,
    covalent_radius: f64,
    electronegativity: f64,
    r4_over_r2: f64,
    hardness: f64,
    excitation_energy: f64,
    eeq: EeqParams,
    references: Vec<RawReference>,
}

#[derive(Debug, Deserialize)]
struct RawReference {
    cn: f64,
    charge: f64,
    alpha: f64,
}

/// Electronegativity-equilibration parameters of one element.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct EeqParams {
    /// Electronegativity.
    pub chi: f64,
    /// Chemical hardness.
    pub eta: f64,
    /// Coordination-number dependence of the electronegativity.
    pub kcn: f64,
    /// Width of the Gaussian charge distribution (Bohr).
    pub radius: f64,
}

/// One reference system of an element.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePoint {
    /// Coordination number of the reference.
    pub cn: f64,
    /// Partial charge of the reference.
    pub charge: f64,
    /// Static dipole polarizability.
    pub alpha: f64,
    /// Dipole polarizability on the imaginary frequency grid.
    pub alpha_iw: [f64; NFREQ],
}

/// Processed reference data of one element, in atomic units.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    pub element: Element,
    /// D3-style covalent radius (4/3 of the single-bond radius) in Bohr.
    pub covalent_radius: f64,
    pub electronegativity: f64,
    /// `sqrt(0.5 * <r4>/<r2> * sqrt(Z))`, the C8/C6 scaling factor.
    pub r4r2: f64,
    pub hardness: f64,
    /// Nuclear charge seen by the charge scaling function.
    pub effective_charge: f64,
    pub eeq: EeqParams,
    pub references: Vec<ReferencePoint>,
}

impl ElementData {
    /// Highest reference coordination number of this element.
    pub fn max_reference_cn(&self) -> f64 {
        self.references
            .iter()
            .map(|r| r.cn)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Process-wide, read-only table of element reference data.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    elements: Vec<ElementData>,
}

impl ReferenceData {
    fn from_toml(source: &str) -> Result<Self, Error> {
        let raw: RawReferenceFile = toml::from_str(source)?;
        let mut elements = Vec::with_capacity(raw.elements.len());
        for (idx, entry) in raw.elements.into_iter().enumerate() {
            let element = entry
                .symbol
                .parse::<Element>()
                .map_err(|e| Error::invalid_input(e.to_string()))?;
            if element.atomic_number() != entry.atomic_number
                || usize::from(entry.atomic_number) != idx + 1
            {
                return Err(Error::invalid_input(format!(
                    "reference data for {} is out of order",
                    entry.symbol
                )));
            }
            if entry.references.is_empty() {
                return Err(Error::invalid_input(format!(
                    "no reference systems for {}",
                    entry.symbol
                )));
            }
            let z = f64::from(entry.atomic_number);
            let references = entry
                .references
                .iter()
                .map(|r| ReferencePoint {
                    cn: r.cn,
                    charge: r.charge,
                    alpha: r.alpha,
                    alpha_iw: single_pole_polarizability(r.alpha, entry.excitation_energy),
                })
                .collect();
            elements.push(ElementData {
                element,
                covalent_radius: 4.0 / 3.0 * entry.covalent_radius * AATOAU,
                electronegativity: entry.electronegativity,
                r4r2: (0.5 * entry.r4_over_r2 * z.sqrt()).sqrt(),
                hardness: entry.hardness,
                effective_charge: z,
                eeq: entry.eeq,
                references,
            });
        }
        Ok(Self { elements })
    }

    /// Returns the data for an atomic number, if supported.
    pub fn get(&self, atomic_number: u8) -> Option<&ElementData> {
        usize::from(atomic_number)
            .checked_sub(1)
            .and_then(|idx| self.elements.get(idx))
    }
}

/// Resolves the element data of every atom.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for atomic numbers without reference data.
pub fn lookup(numbers: &[u8]) -> Result<Vec<&'static ElementData>, Error> {
    let data = reference_data();
    numbers
        .iter()
        .map(|&z| {
            data.get(z)
                .ok_or_else(|| Error::invalid_input(format!("no reference data for Z = {z}")))
        })
        .collect()
}

fn single_pole_polarizability(alpha: f64, excitation: f64) -> [f64; NFREQ] {
    let mut alpha_iw = [0.0; NFREQ];
    for (a, &w) in alpha_iw.iter_mut().zip(FREQUENCIES.iter()) {
        let x = w / excitation;
        *a = alpha / (1.0 + x * x);
    }
    alpha_iw
}

/// Trapezoidal integration weights on [`FREQUENCIES`].
pub fn frequency_weights() -> [f64; NFREQ] {
    let mut weights = [0.0; NFREQ];
    for k in 0..NFREQ {
        let lower = if k > 0 { FREQUENCIES[k] - FREQUENCIES[k - 1] } else { 0.0 };
        let upper = if k + 1 < NFREQ { FREQUENCIES[k + 1] - FREQUENCIES[k] } else { 0.0 };
        weights[k] = 0.5 * (lower + upper);
    }
    weights
}

pub fn reference_data() -> &'static ReferenceData {
    REFERENCE_DATA.get_or_init(|| {
        ReferenceData::from_toml(REFERENCE_TOML)
            .expect("Failed to parse embedded reference data. This is a library bug.")
    })
}

/// Registry of rational damping parameters, keyed by method name.
#[derive(Debug, Clone, Deserialize)]
pub struct DampingTable {
    #[serde(default)]
    pub defaults: DampingDefaults,
    #[serde(default)]
    pub methods: Vec<MethodEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DampingDefaults {
    #[serde(default = "default_s6")]
    pub s6: f64,
    #[serde(default = "default_alp")]
    pub alp: f64,
}

fn default_s6() -> f64 {
    1.0
}
fn default_alp() -> f64 {
    16.0
}

impl Default for DampingDefaults {
    fn default() -> Self {
        Self {
            s6: default_s6(),
            alp: default_alp(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MethodEntry {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub s6: Option<f64>,
    pub s8: f64,
    pub a1: f64,
    pub a2: f64,
    pub alp: Option<f64>,
}

impl MethodEntry {
    fn matches(&self, key: &str) -> bool {
        self.name.to_lowercase() == key || self.aliases.iter().any(|a| a.to_lowercase() == key)
    }
}

impl DampingTable {
    /// Finds a method by name or alias, ignoring case and surrounding whitespace.
    pub fn find(&self, method: &str) -> Option<&MethodEntry> {
        let key = method.trim().to_lowercase();
        self.methods.iter().find(|entry| entry.matches(&key))
    }
}

pub fn load_damping_table(custom_toml: Option<&str>) -> Result<DampingTable, Error> {
    match custom_toml {
        Some(toml) => {
            let table: DampingTable = toml::from_str(toml)?;
            Ok(table)
        }
        None => Ok(get_default_damping_table().clone()),
    }
}

pub fn get_default_damping_table() -> &'static DampingTable {
    DAMPING_TABLE.get_or_init(|| {
        toml::from_str(DAMPING_TOML)
            .expect("Failed to parse embedded damping parameters. This is a library bug.")
    })
}
