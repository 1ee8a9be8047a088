/// ERC-20 token metadata. Primary key: `(chain, address)`.
#[derive(Debug, Clone)]
pub struct Token {
    pub chain: String,
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: i16,
    pub verified: bool,
}
