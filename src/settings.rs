//! 按工具划分的可配置项。
//! 取代逐处`settings?.[key] || {}`式的动态兜底：配置在加载时校验一次，
//! 每个键都有明确的默认值策略，缺失的工具切片退化为默认值而非报错。
use crate::registry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug)]
pub enum Error {
    Io(String),
    Parse(String),
    UnknownTool(String),
    Bounds { tool: String, min: u32, max: u32 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "读取配置文件失败。{e}"),
            Self::Parse(e) => write!(f, "解析配置失败。{e}"),
            Self::UnknownTool(id) => write!(f, "配置中出现未注册的工具id：{id}"),
            Self::Bounds { tool, min, max } => {
                write!(f, "工具{tool}的数量区间非法：min {min} > max {max}")
            }
        }
    }
}
impl std::error::Error for Error {}

/// 单个工具的设置切片。字段齐备，缺失处由默认值补齐。
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct ToolSettings {
    /// 已翻译的界面文案，按i18n键索引
    pub labels: BTreeMap<String, String>,
    pub min_ideas: u32,
    pub max_ideas: u32,
    pub enabled: bool,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            labels: BTreeMap::new(),
            min_ideas: 1,
            max_ideas: 4,
            enabled: true,
        }
    }
}

/// 全部工具设置。加载一次，全程只读。
#[derive(Debug, Clone, Default)]
pub struct Settings {
    tools: HashMap<String, ToolSettings>,
    fallback: ToolSettings,
}

impl Settings {
    /// 从JSON文本加载并校验。
    /// 文档格式：{"tool-id": {"labels": {...}, "min_ideas": n, "max_ideas": n}}
    pub fn load(raw: &str) -> Result<Self, Error> {
        let tools: HashMap<String, ToolSettings> =
            serde_json::from_str(raw).map_err(|e| Error::Parse(e.to_string()))?;

        for (tool_id, slice) in &tools {
            if registry::find(tool_id).is_none() {
                return Err(Error::UnknownTool(tool_id.clone()));
            }
            if slice.min_ideas > slice.max_ideas {
                return Err(Error::Bounds {
                    tool: tool_id.clone(),
                    min: slice.min_ideas,
                    max: slice.max_ideas,
                });
            }
        }

        Ok(Self {
            tools,
            fallback: ToolSettings::default(),
        })
    }

    /// 从文件加载。文件不存在按全默认处理，文件损坏则启动失败。
    pub fn from_file(path: &str) -> Result<Self, Error> {
        if !Path::new(path).exists() {
            tracing::warn!("设置文件{path}不存在，使用默认设置。");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|e| Error::Io(e.to_string()))?;
        Self::load(&raw)
    }

    /// 返回工具的设置切片。未配置的工具退化为默认切片。
    pub fn slice(&self, tool_id: &str) -> &ToolSettings {
        self.tools.get(tool_id).unwrap_or(&self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_validates_bounds() {
        let raw = r#"{"avatar-creator": {"min_ideas": 6, "max_ideas": 3}}"#;
        assert!(matches!(
            Settings::load(raw),
            Err(Error::Bounds { min: 6, max: 3, .. })
        ));
    }

    #[test]
    fn load_rejects_unknown_tool() {
        let raw = r#"{"no-such-tool": {}}"#;
        assert!(matches!(Settings::load(raw), Err(Error::UnknownTool(_))));
    }

    #[test]
    fn load_rejects_malformed_document() {
        assert!(matches!(Settings::load("not json"), Err(Error::Parse(_))));
    }

    #[test]
    fn missing_slice_degrades_to_defaults() {
        let settings = Settings::load(r#"{}"#).unwrap();
        let slice = settings.slice("avatar-creator");
        assert_eq!(slice, &ToolSettings::default());
        assert!(slice.enabled);
    }

    #[test]
    fn configured_slice_wins() {
        let raw = r#"{"avatar-creator": {"labels": {"avatarCreator.title": "Tạo ảnh đại diện"}, "min_ideas": 3, "max_ideas": 9}}"#;
        let settings = Settings::load(raw).unwrap();
        let slice = settings.slice("avatar-creator");
        assert_eq!(slice.min_ideas, 3);
        assert_eq!(slice.max_ideas, 9);
        assert_eq!(
            slice.labels.get("avatarCreator.title").map(String::as_str),
            Some("Tạo ảnh đại diện")
        );
    }
}
