/// ERC-20 token referenced by a pool (PostgreSQL `token` table)
///
/// Primary Key: id
/// Immutable once written: later runs never overwrite an existing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: String,
    pub symbol: String,
    pub name: String,
}

impl Token {
    pub fn new(id: impl Into<String>, symbol: String, name: String) -> Self {
        Self {
            // Always lowercase addresses for consistent comparisons
            id: id.into().to_lowercase(),
            symbol,
            name,
        }
    }
}
