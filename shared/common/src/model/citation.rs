//! Static citation registry entries.

use serde::{Deserialize, Serialize};

/// A static registry entry describing a citable survey/source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationSource {
    pub name: String,
    pub bibcode: String,
    pub reference: String,
    pub alias: String,
}
