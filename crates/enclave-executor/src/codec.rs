//! Request/response envelopes exchanged with the isolated launcher.
//!
//! The host writes one [`WireRequest`] to the process's standard input. The
//! launcher writes exactly one [`WireResponse`] as the last non-empty line of
//! its output; anything before it (plugin chatter, warnings) is ignored.
//!
//! The size ceiling is applied to the raw captured bytes *before* any
//! parsing, so an oversized stream is rejected as a whole and never yields a
//! partial result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use enclave_core::Params;

use crate::error::{ExecError, ExecResult};

/// Default ceiling on captured output: 1 MiB.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Request envelope: the method and its named arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    /// Method to invoke on the plugin instance.
    pub method: String,
    /// Named arguments.
    #[serde(default)]
    pub params: Params,
}

/// Response envelope written by the launcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WireResponse {
    /// The method returned normally.
    Success {
        /// Return value.
        result: Value,
    },
    /// The method raised.
    Error {
        /// The plugin's message.
        error: String,
    },
}

/// Encoder/decoder for the launcher protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireCodec {
    max_payload_bytes: usize,
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

impl WireCodec {
    /// Create a codec with the given output ceiling.
    #[must_use]
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    /// The output ceiling in bytes.
    #[must_use]
    pub fn max_payload_bytes(&self) -> usize {
        self.max_payload_bytes
    }

    /// Encode a request for the launcher's standard input.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Encode`] if serialization fails.
    pub fn encode_request(&self, method: &str, params: &Params) -> ExecResult<Vec<u8>> {
        let request = WireRequest {
            method: method.to_string(),
            params: params.clone(),
        };
        Ok(serde_json::to_vec(&request)?)
    }

    /// Decode a request. Used by launcher stand-ins.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::PayloadTooLarge`] over the ceiling, or
    /// [`ExecError::MalformedOutput`] if the bytes are not a request.
    pub fn decode_request(&self, bytes: &[u8]) -> ExecResult<WireRequest> {
        self.check_size(bytes)?;
        serde_json::from_slice(bytes)
            .map_err(|e| ExecError::MalformedOutput(format!("invalid request envelope: {e}")))
    }

    /// Encode a response line (no trailing newline).
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Encode`] if serialization fails.
    pub fn encode_response(&self, response: &WireResponse) -> ExecResult<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    /// Decode the response envelope from captured output.
    ///
    /// # Errors
    ///
    /// - [`ExecError::PayloadTooLarge`] if `output` exceeds the ceiling
    /// - [`ExecError::MalformedOutput`] if the last non-empty line is not a
    ///   complete envelope
    pub fn decode_response(&self, output: &[u8]) -> ExecResult<WireResponse> {
        self.check_size(output)?;

        let line = last_non_empty_line(output)
            .ok_or_else(|| ExecError::MalformedOutput("plugin produced no output".into()))?;

        let value: Value = serde_json::from_slice(line).map_err(|e| {
            ExecError::MalformedOutput(format!(
                "last output line is not a response envelope: {e}"
            ))
        })?;
        envelope_from_value(value)
    }

    /// Decode captured output into the plugin's return value.
    ///
    /// # Errors
    ///
    /// As [`decode_response`](Self::decode_response), plus
    /// [`ExecError::PluginRaised`] for an error envelope.
    pub fn decode(&self, output: &[u8]) -> ExecResult<Value> {
        match self.decode_response(output)? {
            WireResponse::Success { result } => Ok(result),
            WireResponse::Error { error } => Err(ExecError::PluginRaised(error)),
        }
    }

    fn check_size(&self, bytes: &[u8]) -> ExecResult<()> {
        if bytes.len() > self.max_payload_bytes {
            return Err(ExecError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.max_payload_bytes,
            });
        }
        Ok(())
    }
}

// Numbers are taken over from the parsed line untouched, so integers beyond
// 64 bits keep every digit.
fn envelope_from_value(value: Value) -> ExecResult<WireResponse> {
    let Value::Object(mut envelope) = value else {
        return Err(ExecError::MalformedOutput(
            "response envelope is not an object".into(),
        ));
    };
    let status = envelope
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_owned);
    match status.as_deref() {
        Some("success") => envelope
            .remove("result")
            .map(|result| WireResponse::Success { result })
            .ok_or_else(|| ExecError::MalformedOutput("success envelope has no result".into())),
        Some("error") => match envelope.remove("error") {
            Some(Value::String(error)) => Ok(WireResponse::Error { error }),
            _ => Err(ExecError::MalformedOutput(
                "error envelope has no message".into(),
            )),
        },
        other => Err(ExecError::MalformedOutput(format!(
            "unknown envelope status {other:?}"
        ))),
    }
}

fn last_non_empty_line(output: &[u8]) -> Option<&[u8]> {
    output
        .split(|b| *b == b'\n')
        .map(<[u8]>::trim_ascii)
        .rfind(|line| !line.is_empty())
}
