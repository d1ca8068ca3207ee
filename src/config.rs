//! Runtime settings (environment) and prompt texts (defaults, optional TOML override).
//!
//! Environment:
//!   PORT                  : u16 (default 3000)
//!   GEMINI_BASE_URL       : default "https://generativelanguage.googleapis.com/v1beta"
//!   GEMINI_MODEL          : default "gemini-2.5-flash"
//!   GEMINI_TIMEOUT_SECS   : backend HTTP timeout (default 60)
//!   PHYSIMIND_KEY_FILE    : credential slot file (default "./data/credentials.json")
//!   PHYSIMIND_CONFIG_PATH : TOML file overriding `[prompts]`
//!   STATIC_DIR            : browser client directory (default "./static")

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{error, info};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Clone, Debug)]
pub struct Settings {
  pub port: u16,
  pub gemini_base_url: String,
  pub gemini_model: String,
  pub gemini_timeout: Duration,
  pub key_file: PathBuf,
  pub static_dir: PathBuf,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      port: 3000,
      gemini_base_url: DEFAULT_BASE_URL.into(),
      gemini_model: DEFAULT_MODEL.into(),
      gemini_timeout: Duration::from_secs(60),
      key_file: PathBuf::from("./data/credentials.json"),
      static_dir: PathBuf::from("./static"),
    }
  }
}

impl Settings {
  pub fn from_env() -> Self {
    Self::from_lookup(|name| std::env::var(name).ok())
  }

  /// Build settings from any variable source; unparsable numbers keep the default.
  pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
    let defaults = Self::default();
    let non_empty = |name: &str| get(name).filter(|v| !v.trim().is_empty());

    Self {
      port: non_empty("PORT")
        .and_then(|p| p.trim().parse::<u16>().ok())
        .unwrap_or(defaults.port),
      gemini_base_url: non_empty("GEMINI_BASE_URL")
        .map(|u| u.trim_end_matches('/').to_string())
        .unwrap_or(defaults.gemini_base_url),
      gemini_model: non_empty("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
      gemini_timeout: non_empty("GEMINI_TIMEOUT_SECS")
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(defaults.gemini_timeout),
      key_file: non_empty("PHYSIMIND_KEY_FILE").map(PathBuf::from).unwrap_or(defaults.key_file),
      static_dir: non_empty("STATIC_DIR").map(PathBuf::from).unwrap_or(defaults.static_dir),
    }
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
}

/// System instructions and user templates sent to the backend.
/// Any field omitted in TOML keeps its default.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub chat_system: String,
  pub solver_system: String,
  /// `{text}` is the learner's problem statement or note.
  pub solver_user_template: String,
  /// `{count}` questions on `{topic}`.
  pub quiz_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      chat_system: "Bạn là một giáo sư Vật lý nhiệt tình, am hiểu sâu rộng và giỏi sư phạm. Hãy giải thích các khái niệm phức tạp một cách dễ hiểu, sử dụng ví dụ thực tế. Luôn trả lời bằng tiếng Việt. Sử dụng định dạng Markdown để làm nổi bật công thức hoặc ý chính.".into(),
      solver_system: "Bạn là một trợ lý giải bài tập Vật lý chuyên nghiệp. Hãy trình bày lời giải rõ ràng, mạch lạc, có tóm tắt đề bài, công thức sử dụng và đáp án cuối cùng.".into(),
      solver_user_template: "Hãy giải bài tập vật lý này chi tiết từng bước. Nếu có hình ảnh, hãy phân tích hình ảnh để lấy dữ liệu. \n\nĐề bài/Câu hỏi bổ sung: {text}".into(),
      quiz_user_template: "Tạo {count} câu hỏi trắc nghiệm về chủ đề: {topic}. Độ khó trung bình-khá.".into(),
    }
  }
}

/// Load prompts from PHYSIMIND_CONFIG_PATH, falling back to defaults on any IO/parse error.
pub fn load_prompts_from_env() -> Prompts {
  let Ok(path) = std::env::var("PHYSIMIND_CONFIG_PATH") else {
    return Prompts::default();
  };
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AgentConfig>(&s) {
      Ok(cfg) => {
        info!(target: "physimind_backend", %path, "Loaded prompt config (TOML)");
        cfg.prompts
      }
      Err(e) => {
        error!(target: "physimind_backend", %path, error = %e, "Failed to parse TOML config; using default prompts");
        Prompts::default()
      }
    },
    Err(e) => {
      error!(target: "physimind_backend", %path, error = %e, "Failed to read TOML config file; using default prompts");
      Prompts::default()
    }
  }
}
