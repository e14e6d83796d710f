use std::collections::HashMap;

use uuid::Uuid;

/// Read-only view of a case, joined up to the survey its collection
/// exercise belongs to.
#[derive(Debug, Clone)]
pub struct Case {
    pub id: Uuid,
    pub collection_exercise_id: Uuid,
    pub survey_id: Uuid,
    pub sample: HashMap<String, String>,
    pub sample_sensitive: HashMap<String, String>,
}
