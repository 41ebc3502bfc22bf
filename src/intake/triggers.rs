//! Keyword routing: classify an inbound text into the intent it carries.

use std::sync::LazyLock;

use regex::Regex;

/// Literal prefix the user must type when creating a department.
pub const NEW_ADDRESS_PREFIX: &str = "Nuevo departamento: ";

/// Button label offering to create a department.
pub const CREATE_NEW_LABEL: &str = "Crear nuevo";

/// Button label prefix for picking candidate `n`.
pub const SELECT_LABEL_PREFIX: &str = "Seleccionar: ";

static NEW_ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*nuevo\s+departamento\s*:(.*)$").unwrap());

static SELECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*seleccionar\b\s*:?\s*(.*)$").unwrap());

static SELECT_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*seleccionar\s*:?\s*(\d+)\s*$").unwrap());

static BARE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*$").unwrap());

static LEADING_DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)").unwrap());

/// What an inbound message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// `Nuevo departamento: <address>`; the address is trimmed and may be empty.
    NewAddress(String),
    /// A candidate pick. `None` when the number couldn't be read.
    Select(Option<usize>),
    /// The user wants to create a department.
    CreateNew,
    /// A report naming an address ("... en <address> ...").
    AddressBearing,
    Unrecognized,
}

impl Inbound {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewAddress(_) => "new_address",
            Self::Select(_) => "select",
            Self::CreateNew => "create_new",
            Self::AddressBearing => "address_bearing",
            Self::Unrecognized => "unrecognized",
        }
    }
}

/// Classify `text`. Earlier rules win: a new-address reply, an exact
/// selection label or bare number, an address-bearing report, any other
/// `Seleccionar` reply, then create intent.
///
/// Reports outrank the loose keyword rules, so "hay que crear una rampa en
/// moreno" starts a search instead of being read as a button press.
pub fn classify(text: &str) -> Inbound {
    if let Some(caps) = NEW_ADDRESS_RE.captures(text) {
        let address = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        return Inbound::NewAddress(address.to_string());
    }

    if let Some(caps) = SELECT_LABEL_RE
        .captures(text)
        .or_else(|| BARE_NUMBER_RE.captures(text))
    {
        return Inbound::Select(caps.get(1).and_then(|m| m.as_str().parse().ok()));
    }

    let lower = text.to_lowercase();
    if is_address_bearing(&lower) {
        return Inbound::AddressBearing;
    }

    if let Some(caps) = SELECT_RE.captures(text) {
        let rest = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        return Inbound::Select(parse_index(rest));
    }

    if lower.contains("crear") {
        return Inbound::CreateNew;
    }
    Inbound::Unrecognized
}

/// Whether a lowercased text looks like a report naming an address.
fn is_address_bearing(lower: &str) -> bool {
    lower.contains("en ") || lower.contains(" departamento ")
}

/// Parse the leading digits of `rest` as a 1-based index.
fn parse_index(rest: &str) -> Option<usize> {
    LEADING_DIGITS_RE
        .captures(rest.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Button label for candidate `n` (1-based).
pub fn select_label(n: usize) -> String {
    format!("{SELECT_LABEL_PREFIX}{n}")
}
