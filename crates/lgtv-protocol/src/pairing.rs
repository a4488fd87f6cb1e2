//! Pairing manifest and registration outcomes
//!
//! The device grants a persistent client key in exchange for a capability
//! manifest. A known key is sent back with the manifest on every connect; the
//! device then answers immediately. Without one, the device first reports
//! that an on-screen prompt is showing and pushes the key on the same
//! correlation id once the user accepts.

use serde_json::{json, Value};

use crate::error::ProtocolError;

/// Field carrying the client key in both directions
pub const CLIENT_KEY_FIELD: &str = "client-key";

/// Capability manifest sent with every registration
#[derive(Debug, Clone, PartialEq)]
pub struct PairingManifest(Value);

impl PairingManifest {
    /// Wrap a custom manifest, which must be a JSON object
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        if !value.is_object() {
            return Err(ProtocolError::InvalidManifest {
                reason: "manifest must be a JSON object".to_string(),
            });
        }
        Ok(Self(value))
    }

    /// The manifest body
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Registration payload: the manifest plus the client key, if one is known
    pub fn registration_payload(&self, client_key: Option<&str>) -> Value {
        let mut payload = self.0.clone();
        if let Some(object) = payload.as_object_mut() {
            match client_key {
                Some(key) => {
                    object.insert(CLIENT_KEY_FIELD.to_string(), Value::String(key.to_string()));
                }
                None => {
                    object.remove(CLIENT_KEY_FIELD);
                }
            }
        }
        payload
    }
}

impl Default for PairingManifest {
    fn default() -> Self {
        Self(default_manifest())
    }
}

/// What a registration answer means for the pairing state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Device granted (or confirmed) a client key
    Granted(String),
    /// Device is showing an approval prompt; the key arrives later on the same id
    PromptRequired,
}

impl RegistrationOutcome {
    /// Interpret a registration answer payload
    pub fn from_payload(payload: &Value) -> Result<Self, ProtocolError> {
        match payload.get(CLIENT_KEY_FIELD) {
            None | Some(Value::Null) => Ok(Self::PromptRequired),
            Some(Value::String(key)) if !key.is_empty() => Ok(Self::Granted(key.clone())),
            Some(Value::String(_)) => Err(ProtocolError::MalformedPairing {
                reason: "client-key is empty".to_string(),
            }),
            Some(other) => Err(ProtocolError::MalformedPairing {
                reason: format!("client-key is not a string: {}", other),
            }),
        }
    }
}

fn default_manifest() -> Value {
    json!({
        "forcePairing": false,
        "pairingType": "PROMPT",
        "manifest": {
            "manifestVersion": 1,
            "appVersion": "1.1",
            "signed": {
                "created": "20140509",
                "appId": "com.lge.test",
                "vendorId": "com.lge",
                "localizedAppNames": {
                    "": "LG Remote App"
                },
                "localizedVendorNames": {
                    "": "LG Electronics"
                },
                "permissions": [
                    "TEST_SECURE",
                    "CONTROL_INPUT_TEXT",
                    "CONTROL_MOUSE_AND_KEYBOARD",
                    "READ_INSTALLED_APPS",
                    "READ_LGE_SDX",
                    "READ_NOTIFICATIONS",
                    "SEARCH",
                    "WRITE_SETTINGS",
                    "WRITE_NOTIFICATION_ALERT",
                    "CONTROL_POWER",
                    "READ_CURRENT_CHANNEL",
                    "READ_RUNNING_APPS",
                    "READ_UPDATE_INFO",
                    "UPDATE_FROM_REMOTE_APP",
                    "READ_LGE_TV_INPUT_EVENTS",
                    "READ_TV_CURRENT_TIME"
                ],
                "serial": "2f930e2d2cfe083771f68e4fe7bb07"
            },
            "permissions": [
                "LAUNCH",
                "LAUNCH_WEBAPP",
                "APP_TO_APP",
                "CLOSE",
                "TEST_OPEN",
                "TEST_PROTECTED",
                "CONTROL_AUDIO",
                "CONTROL_DISPLAY",
                "CONTROL_INPUT_JOYSTICK",
                "CONTROL_INPUT_MEDIA_RECORDING",
                "CONTROL_INPUT_MEDIA_PLAYBACK",
                "CONTROL_INPUT_TV",
                "CONTROL_POWER",
                "READ_APP_STATUS",
                "READ_CURRENT_CHANNEL",
                "READ_INPUT_DEVICE_LIST",
                "READ_NETWORK_STATE",
                "READ_RUNNING_APPS",
                "READ_TV_CHANNEL_LIST",
                "WRITE_NOTIFICATION_TOAST",
                "READ_POWER_STATE",
                "READ_COUNTRY_INFO"
            ],
            "signatures": [
                {
                    "signatureVersion": 1,
                    "signature": "eyJhbGdvcml0aG0iOiJSU0EtU0hBMjU2Iiwia2V5SWQiOiJ0ZXN0LXNpZ25pbmctY2VydCIsInNpZ25hdHVyZVZlcnNpb24iOjF9.hrVRgjCwXVvE2OOSpDZ58hR+59aFNwYDyjQgKk3auukd7pcegmE2CzPCa0bJ0ZsRAcKkCTJrWo5iDzNhMBWRyaMOv5zWSrthlf7G128qvIlpMT0YNY+n/FaOHE73uLrS/g7swl3/qH/BGFG2Hu4RlL48eb3lLKqTt2xKHdCs6Cd4RMfJPYnzgvI4BNrFUKsjkcu+WD4OO2A27Pq1n50cMchmcaXadJhGrOqH5YmHdOCj5NSHzJYrsW0HPlpuAx/ECMeIZYDh6RMqaFM2DXzdKX9NmmyqzJ3o/0lkk/N97gfVRLW5hA29yeAwaCViZNCP8iC9aO0q9fQojoa7NQnAtw=="
                }
            ]
        }
    })
}
