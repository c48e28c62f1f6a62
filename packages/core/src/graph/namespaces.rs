//! Vocabulary and IRI conventions
//!
//! Node subjects are `<base_uri><id>` with the id percent-encoded, so any
//! non-empty id yields a valid IRI. Field predicates come from four fixed
//! vocabularies, which are also the only prefixes declared in written text.

pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
pub const DC: &str = "http://purl.org/dc/terms/";
pub const TS: &str = "http://purl.org/stuff/trestle/";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const DC_TITLE: &str = "http://purl.org/dc/terms/title";
pub const DC_CREATED: &str = "http://purl.org/dc/terms/created";
pub const DC_DESCRIPTION: &str = "http://purl.org/dc/terms/description";
pub const TS_PARENT: &str = "http://purl.org/stuff/trestle/parent";
pub const TS_INDEX: &str = "http://purl.org/stuff/trestle/index";

pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

/// Base URI used when none is configured
pub const DEFAULT_BASE_URI: &str = "http://example.org/trestle/";

/// Prefix table plus the base URI for node subjects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    base_uri: String,
    prefixes: Vec<(&'static str, &'static str)>,
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URI)
    }
}

impl Namespaces {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            prefixes: vec![("rdf", RDF), ("xsd", XSD), ("dc", DC), ("ts", TS)],
        }
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Declared prefixes in output order
    pub fn prefixes(&self) -> &[(&'static str, &'static str)] {
        &self.prefixes
    }

    /// Subject IRI for a node id
    pub fn node_iri(&self, id: &str) -> String {
        format!("{}{}", self.base_uri, urlencoding::encode(id))
    }

    /// Node id for a subject IRI
    ///
    /// Strips the base URI when present; foreign IRIs fall back to their last
    /// path or fragment segment. Percent-escapes are decoded.
    pub fn node_id(&self, iri: &str) -> String {
        let segment = match iri.strip_prefix(self.base_uri.as_str()) {
            Some(id) if !id.is_empty() => id,
            _ => iri.rsplit(['/', '#']).find(|s| !s.is_empty()).unwrap_or(iri),
        };
        match urlencoding::decode(segment) {
            Ok(id) => id.into_owned(),
            Err(e) => {
                tracing::warn!("Keeping undecodable node IRI segment '{}': {}", segment, e);
                segment.to_string()
            }
        }
    }
}
