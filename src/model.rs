
/// Columns appended to every output row, in output order.
pub const RESULT_COLUMNS: [&str; 12] = [
    "formatted_address",
    "latitude",
    "longitude",
    "state",
    "county",
    "city",
    "postal_code",
    "country",
    "confidence",
    "state_senate_district",
    "state_house_district",
    "input_string",
];

/// One address as read from the input table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub row: usize,
    pub raw: Option<String>,
}

impl AddressRecord {
    pub fn new(row: usize, raw: Option<String>) -> Self {
        Self { row, raw }
    }

    pub fn input_string(&self) -> &str {
        self.raw.as_deref().unwrap_or("")
    }
}

/// First candidate returned by the geocoding provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMatch {
    pub formatted_address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub country: Option<String>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Districts {
    pub senate: Option<String>,
    pub house: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeocodeResult {
    pub formatted_address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub confidence: Option<f64>,
    pub state_senate_district: Option<String>,
    pub state_house_district: Option<String>,
    pub input_string: String,
}

impl GeocodeResult {
    /// The row emitted for misses, failures and blank input.
    pub fn empty(input: impl Into<String>) -> Self {
        Self {
            input_string: input.into(),
            ..Self::default()
        }
    }

    pub fn from_match(input: impl Into<String>, found: ProviderMatch, districts: Districts) -> Self {
        Self {
            formatted_address: found.formatted_address,
            latitude: Some(found.latitude),
            longitude: Some(found.longitude),
            state: found.state,
            county: found.county,
            city: found.city,
            postal_code: found.postal_code,
            country: found.country,
            confidence: found.confidence,
            state_senate_district: districts.senate,
            state_house_district: districts.house,
            input_string: input.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.formatted_address.is_none() && self.latitude.is_none() && self.longitude.is_none()
    }

    /// Cell values in `RESULT_COLUMNS` order; `None` becomes an empty cell.
    pub fn to_cells(&self) -> Vec<String> {
        fn text(value: &Option<String>) -> String {
            value.clone().unwrap_or_default()
        }
        fn number(value: Option<f64>) -> String {
            value.map(|v| v.to_string()).unwrap_or_default()
        }

        vec![
            text(&self.formatted_address),
            number(self.latitude),
            number(self.longitude),
            text(&self.state),
            text(&self.county),
            text(&self.city),
            text(&self.postal_code),
            text(&self.country),
            number(self.confidence),
            text(&self.state_senate_district),
            text(&self.state_house_district),
            self.input_string.clone(),
        ]
    }
}
