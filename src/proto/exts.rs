use super::journal_engine::ApiKey;
use super::journal_engine::ApiVersion;
use super::journal_engine::JournalEngineError;
use super::journal_engine::ReqHeader;
use super::journal_engine::RespHeader;
use crate::Error;

impl ReqHeader {
    pub fn v0(api_key: ApiKey) -> Self {
        Self {
            api_key: api_key as i32,
            api_version: ApiVersion::V0 as i32,
        }
    }
}

impl RespHeader {
    /// Echo the request's api key and version without an error
    pub fn ok(req: &ReqHeader) -> Self {
        Self {
            api_key: req.api_key,
            api_version: req.api_version,
            error: None,
        }
    }

    pub fn with_error(
        req: &ReqHeader,
        err: &Error,
    ) -> Self {
        Self {
            api_key: req.api_key,
            api_version: req.api_version,
            error: Some(JournalEngineError::from(err)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl From<&Error> for JournalEngineError {
    fn from(err: &Error) -> Self {
        JournalEngineError {
            code: err.wire_code().to_string(),
            error: err.to_string(),
        }
    }
}

impl From<Error> for JournalEngineError {
    fn from(err: Error) -> Self {
        JournalEngineError::from(&err)
    }
}

impl ApiKey {
    /// Apis served by this node, anything else is answered in-band with
    /// `UnimplementedApi`.
    pub fn is_supported(self) -> bool {
        !matches!(self, ApiKey::Unimplemented)
    }
}
