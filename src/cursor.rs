//! Opaque search-after tokens: the sort-key values of the last row of a page,
//! comma-joined and URL-safe base64 encoded.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};

use crate::error::{Result, SearchError};

pub const DELIMITER: char = ',';

// Unpadded on the way out, padding tolerated on the way in.
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn encode<S: AsRef<str>>(keys: &[S]) -> String {
    let joined = keys
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string());
    TOKEN_ENGINE.encode(joined)
}

/// Decode a token back into its sort-key values. The field count is not
/// checked here; a wrong count is for the backend to reject.
pub fn decode(token: Option<&str>) -> Result<Option<Vec<String>>> {
    let Some(token) = token else {
        return Ok(None);
    };

    let bytes = TOKEN_ENGINE
        .decode(token)
        .map_err(|_| SearchError::invalid("token is not a valid pagination cursor"))?;
    let joined = String::from_utf8(bytes)
        .map_err(|_| SearchError::invalid("token is not a valid pagination cursor"))?;

    Ok(Some(joined.split(DELIMITER).map(str::to_string).collect()))
}
