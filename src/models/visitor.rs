use serde::{Deserialize, Serialize};

/// An appended visitor, the identity a lead's email engagement hangs off.
///
/// Rows are written by the upstream append process and only read here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visitor {
    pub id: i64,
    pub email: String,
}
