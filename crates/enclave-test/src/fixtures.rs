//! Test fixtures for plugins, callers and parameters.

use serde_json::Value;

use enclave_core::{Caller, Params, UserId};
use enclave_executor::TrustedPlugin;

/// Source of a plugin whose `echo` method returns its arguments.
pub const ECHO_PLUGIN_SOURCE: &str = r#"class Plugin:
    def echo(self, **params):
        return params
"#;

/// Source of a plugin whose `run` method always raises "bad input".
pub const RAISING_PLUGIN_SOURCE: &str = r#"class Plugin:
    def run(self, **params):
        raise ValueError("bad input")
"#;

/// Source of a plugin that prints while importing and while running, and
/// returns an integer wider than 64 bits.
pub const CHATTY_PLUGIN_SOURCE: &str = r#"print("importing chatty plugin")


class Plugin:
    def greet(self, name, **params):
        print("warming up")
        return {"greeting": "hello " + name, "big": 2 ** 64 + 1}
"#;

/// Create a regular caller with a fresh identity.
#[must_use]
pub fn test_user() -> Caller {
    Caller::user(UserId::new())
}

/// Create an elevated caller with a fresh identity.
#[must_use]
pub fn test_admin() -> Caller {
    Caller::admin(UserId::new())
}

/// Build a [`Params`] map from a JSON object literal.
///
/// # Panics
///
/// Panics if `value` is not a JSON object.
#[must_use]
pub fn test_params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        other => panic!("test params must be a JSON object, got {other}"),
    }
}

/// Trusted plugin with `echo`, `fail` and `panic` methods.
#[derive(Debug, Default)]
pub struct EchoTrustedPlugin;

impl TrustedPlugin for EchoTrustedPlugin {
    fn methods(&self) -> Vec<String> {
        vec!["echo".to_string(), "fail".to_string(), "panic".to_string()]
    }

    fn call(&mut self, method: &str, params: Params) -> Result<Value, String> {
        match method {
            "echo" => Ok(Value::Object(params)),
            "fail" => Err("bad input".to_string()),
            _ => panic!("trusted plugin panicked"),
        }
    }
}

/// Factory for [`EchoTrustedPlugin`], suitable for a trusted catalog.
#[must_use]
pub fn echo_trusted_plugin() -> Box<dyn TrustedPlugin> {
    Box::new(EchoTrustedPlugin)
}
