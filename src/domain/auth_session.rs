/// The raw credential pair handed to a caller exactly once.
///
/// The refresh token is unrecoverable after this leaves the issuing call;
/// only its hash is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Audit metadata captured alongside a refresh record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
}
