#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertRequestResult {
    Inserted(String),
    AlreadyExists(String),
}
