use serde::{Deserialize, Serialize};

/// A freshly minted access-code / questionnaire-id pair, as returned by
/// the code-generation service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UacQidPair {
    pub uac: String,
    pub qid: String,
}
