use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Message kinds carried in the `type` field of an [`Envelope`].
pub mod kind {
    pub const FRAME: &str = "frame";
    pub const GESTURE: &str = "gesture";
    pub const CLUTCH: &str = "clutch";
    pub const DICTATION: &str = "dictation";
    pub const ACTION: &str = "action";
    pub const CONFIG: &str = "config";

    pub const GET_CONFIG: &str = "get_config";
    pub const UPDATE_GESTURE: &str = "update_gesture";
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    #[default]
    None,
    OpenPalm,
    PeaceSign,
    ThumbsUp,
    ThumbsDown,
    Pointing,
    OkSign,
    RockSign,
    Shaka,
    ThreeFingers,
    FourFingers,
}

impl Gesture {
    pub const ALL: [Gesture; 11] = [
        Gesture::None,
        Gesture::OpenPalm,
        Gesture::PeaceSign,
        Gesture::ThumbsUp,
        Gesture::ThumbsDown,
        Gesture::Pointing,
        Gesture::OkSign,
        Gesture::RockSign,
        Gesture::Shaka,
        Gesture::ThreeFingers,
        Gesture::FourFingers,
    ];

    /// Gestures that can carry a binding (everything except `none`).
    pub const BINDABLE: [Gesture; 10] = [
        Gesture::OpenPalm,
        Gesture::PeaceSign,
        Gesture::ThumbsUp,
        Gesture::ThumbsDown,
        Gesture::Pointing,
        Gesture::OkSign,
        Gesture::RockSign,
        Gesture::Shaka,
        Gesture::ThreeFingers,
        Gesture::FourFingers,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Gesture::None => "none",
            Gesture::OpenPalm => "open_palm",
            Gesture::PeaceSign => "peace_sign",
            Gesture::ThumbsUp => "thumbs_up",
            Gesture::ThumbsDown => "thumbs_down",
            Gesture::Pointing => "pointing",
            Gesture::OkSign => "ok_sign",
            Gesture::RockSign => "rock_sign",
            Gesture::Shaka => "shaka",
            Gesture::ThreeFingers => "three_fingers",
            Gesture::FourFingers => "four_fingers",
        }
    }

    /// Title-cased name, e.g. `thumbs_up` -> "Thumbs Up".
    pub fn label(self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown gesture: {0:?}")]
pub struct UnknownGesture(pub String);

impl FromStr for Gesture {
    type Err = UnknownGesture;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Gesture::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| UnknownGesture(s.to_string()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Local,
    /// Remote fallback classifier.
    #[serde(rename = "gemini")]
    RemoteFallback,
    #[default]
    Unset,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpecialAction {
    VoiceDictation,
    ClearInput,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct GestureBinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<SpecialAction>,
    #[serde(default)]
    pub description: String,
}

impl GestureBinding {
    pub fn command(command: &str, description: &str) -> Self {
        Self {
            command: Some(command.to_string()),
            action: None,
            description: description.to_string(),
        }
    }

    pub fn special(action: SpecialAction, description: &str) -> Self {
        Self {
            command: None,
            action: Some(action),
            description: description.to_string(),
        }
    }

    /// Special bindings trigger a built-in action and are not editable as free text.
    pub fn is_special(&self) -> bool {
        self.action.is_some()
    }
}

pub type GestureConfigMap = BTreeMap<Gesture, GestureBinding>;

/// Factory bindings shipped with the backend.
pub fn default_gesture_config() -> GestureConfigMap {
    BTreeMap::from([
        (
            Gesture::OpenPalm,
            GestureBinding::special(SpecialAction::VoiceDictation, "Voice Input"),
        ),
        (Gesture::PeaceSign, GestureBinding::command("start the dev server", "Start Server")),
        (Gesture::ThumbsUp, GestureBinding::command("commit and push", "Commit & Push")),
        (
            Gesture::ThumbsDown,
            GestureBinding::special(SpecialAction::ClearInput, "Clear Input"),
        ),
        (Gesture::Pointing, GestureBinding::command("kill the running server", "Stop Server")),
        (Gesture::OkSign, GestureBinding::command("/help", "Help")),
        (Gesture::RockSign, GestureBinding::command("run tests", "Run Tests")),
        (Gesture::Shaka, GestureBinding::command("/clear", "Clear Chat")),
        (Gesture::ThreeFingers, GestureBinding::command("explain this code", "Explain Code")),
        (Gesture::FourFingers, GestureBinding::command("/cost", "Show Cost")),
    ])
}

pub const COMMAND_PRESETS: &[(&str, &[&str])] = &[
    (
        "claude_commands",
        &["/help", "/clear", "/compact", "/cost", "/doctor", "/status"],
    ),
    (
        "dev_commands",
        &[
            "start the dev server",
            "kill the running server",
            "run tests",
            "run the build",
            "check for errors",
        ],
    ),
    (
        "git_commands",
        &[
            "commit and push",
            "show git status",
            "create a pull request",
            "undo the last commit",
        ],
    ),
    (
        "code_commands",
        &[
            "explain this code",
            "find bugs in this code",
            "refactor this function",
            "add comments to this code",
        ],
    ),
];

/// Untyped `{ type, payload }` wrapper used in both directions.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Option<Map<String, Value>>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.unwrap_or_default(),
        }
    }

    /// Re-read the envelope as one of the typed message enums.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        let mut obj = Map::new();
        obj.insert("type".to_string(), Value::String(self.kind));
        obj.insert("payload".to_string(), Value::Object(self.payload));
        serde_json::from_value(Value::Object(obj))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum ServerMessage {
    Frame {
        frame: String,
    },
    Gesture {
        gesture: Gesture,
        confidence: f32,
        source: DetectionSource,
        #[serde(default)]
        triggered: bool,
    },
    Clutch {
        engaged: bool,
        #[serde(rename = "stableFrames")]
        stable_frames: u32,
    },
    Dictation {
        active: bool,
    },
    Action {
        description: String,
        gesture: Gesture,
        #[serde(default = "default_success")]
        success: bool,
    },
    Config {
        gestures: GestureConfigMap,
    },
}

fn default_success() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum ClientCommand {
    GetConfig {},
    UpdateGesture { gesture: Gesture, command: String },
}

impl ClientCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientCommand::GetConfig {} => kind::GET_CONFIG,
            ClientCommand::UpdateGesture { .. } => kind::UPDATE_GESTURE,
        }
    }
}
