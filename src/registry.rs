//! 工具注册表。声明式的工具定义驱动页面组合层。
//! 每个工具都通过ToolSession获得完全一致的状态契约。
use serde::Serialize;
use serde_json::{json, Map, Value};

/// 单个生成工具的静态定义。运行期只读。
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub id: &'static str,
    pub title_key: &'static str,
    pub description_key: &'static str,
    pub uploader_caption_key: &'static str,
    pub min_ideas: u32,
    pub max_ideas: u32,
}

const fn tool(
    id: &'static str,
    title_key: &'static str,
    description_key: &'static str,
    uploader_caption_key: &'static str,
    min_ideas: u32,
    max_ideas: u32,
) -> ToolSpec {
    ToolSpec {
        id,
        title_key,
        description_key,
        uploader_caption_key,
        min_ideas,
        max_ideas,
    }
}

/// 全部工具。新增工具时同步维护initial_state_for。
pub const TOOLS: &[ToolSpec] = &[
    tool(
        "architecture-ideator",
        "architectureIdeator.title",
        "architectureIdeator.description",
        "architectureIdeator.uploaderCaption",
        1,
        1,
    ),
    tool(
        "avatar-creator",
        "avatarCreator.title",
        "avatarCreator.description",
        "avatarCreator.uploaderCaption",
        3,
        9,
    ),
    tool(
        "baby-photo-creator",
        "babyPhotoCreator.title",
        "babyPhotoCreator.description",
        "babyPhotoCreator.uploaderCaption",
        3,
        9,
    ),
    tool(
        "beauty-creator",
        "beautyCreator.title",
        "beautyCreator.description",
        "beautyCreator.uploaderCaption",
        3,
        9,
    ),
    tool(
        "mid-autumn-creator",
        "midAutumnCreator.title",
        "midAutumnCreator.description",
        "midAutumnCreator.uploaderCaption",
        3,
        9,
    ),
    tool(
        "entrepreneur-creator",
        "entrepreneurCreator.title",
        "entrepreneurCreator.description",
        "entrepreneurCreator.uploaderCaption",
        3,
        9,
    ),
    tool(
        "dress-the-model",
        "dressTheModel.title",
        "dressTheModel.description",
        "dressTheModel.uploaderCaption",
        1,
        1,
    ),
    tool(
        "portrait-generator",
        "portraitGenerator.title",
        "portraitGenerator.description",
        "portraitGenerator.uploaderCaption",
        1,
        4,
    ),
    tool(
        "photo-restoration",
        "photoRestoration.title",
        "photoRestoration.description",
        "photoRestoration.uploaderCaption",
        1,
        1,
    ),
    tool(
        "swap-style",
        "swapStyle.title",
        "swapStyle.description",
        "swapStyle.uploaderCaption",
        1,
        1,
    ),
    tool(
        "free-generation",
        "freeGeneration.title",
        "freeGeneration.description",
        "freeGeneration.uploaderCaption",
        1,
        4,
    ),
    tool(
        "image-to-real",
        "imageToReal.title",
        "imageToReal.description",
        "imageToReal.uploaderCaption",
        1,
        1,
    ),
    tool(
        "toy-model-creator",
        "toyModelCreator.title",
        "toyModelCreator.description",
        "toyModelCreator.uploaderCaption",
        1,
        1,
    ),
    tool(
        "face-swap",
        "faceSwap.title",
        "faceSwap.description",
        "faceSwap.uploaderCaption",
        1,
        1,
    ),
    tool(
        "id-photo-creator",
        "idPhotoCreator.title",
        "idPhotoCreator.description",
        "idPhotoCreator.uploaderCaption",
        1,
        4,
    ),
    tool(
        "object-remover",
        "objectRemover.title",
        "objectRemover.description",
        "objectRemover.uploaderCaption",
        1,
        1,
    ),
];

/// 按id查找工具定义
pub fn find(tool_id: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|t| t.id == tool_id)
}

// 多数创意类工具共享同一套初始状态骨架
fn idea_tool_state(option_key: &str) -> Value {
    json!({
        "stage": "idle",
        "uploadedImage": null,
        "styleReferenceImage": null,
        "generatedImages": {},
        "historicalImages": [],
        "selectedIdeas": [],
        "options": { option_key: "", "removeWatermark": false, "aspectRatio": "Giữ nguyên" },
        "error": null
    })
}

/// 工具页面初始挂载时的状态。未知id回退为主页状态。
pub fn initial_state_for(tool_id: &str) -> Value {
    match tool_id {
        "architecture-ideator" => json!({
            "stage": "idle",
            "uploadedImage": null,
            "styleReferenceImage": null,
            "generatedImage": null,
            "historicalImages": [],
            "options": { "context": "", "style": "", "color": "", "lighting": "", "notes": "", "removeWatermark": false },
            "error": null
        }),
        "avatar-creator" | "baby-photo-creator" | "mid-autumn-creator" | "entrepreneur-creator" => {
            idea_tool_state("additionalPrompt")
        }
        "beauty-creator" => idea_tool_state("notes"),
        "dress-the-model" => json!({
            "stage": "idle",
            "modelImage": null,
            "clothingImage": null,
            "generatedImage": null,
            "historicalImages": [],
            "options": { "background": "", "pose": "", "style": "", "aspectRatio": "Giữ nguyên", "notes": "", "removeWatermark": false },
            "error": null
        }),
        "portrait-generator" => json!({
            "stage": "configuring",
            "prompt": "",
            "uploadedImage": null,
            "resultImage": null,
            "options": { "style": "", "lighting": "", "background": "", "notes": "" },
            "error": null
        }),
        "photo-restoration" => json!({
            "stage": "idle",
            "uploadedImage": null,
            "generatedImage": null,
            "historicalImages": [],
            "options": { "type": "Chân dung", "gender": "Tự động", "age": "", "nationality": "", "notes": "", "removeWatermark": false, "removeStains": true, "colorizeRgb": true },
            "error": null
        }),
        "swap-style" => json!({
            "stage": "idle",
            "contentImage": null,
            "styleImage": null,
            "generatedImage": null,
            "historicalImages": [],
            "options": { "style": "", "styleStrength": "Rất mạnh", "notes": "", "removeWatermark": false, "convertToReal": false },
            "error": null
        }),
        "free-generation" => json!({
            "stage": "configuring",
            "image1": null,
            "image2": null,
            "image3": null,
            "image4": null,
            "generatedImages": [],
            "historicalImages": [],
            "options": { "prompt": "", "removeWatermark": false, "numberOfImages": 1, "aspectRatio": "Giữ nguyên" },
            "error": null
        }),
        "image-to-real" => json!({
            "stage": "idle",
            "uploadedImage": null,
            "generatedImage": null,
            "historicalImages": [],
            "options": { "faithfulness": "Tự động", "notes": "", "removeWatermark": false },
            "error": null
        }),
        "toy-model-creator" => json!({
            "stage": "idle",
            "uploadedImage": null,
            "generatedImage": null,
            "historicalImages": [],
            "concept": "desktop_model",
            "options": { "computerType": "", "softwareType": "", "boxType": "", "background": "", "accompanyingItems": "", "deskSurface": "", "notes": "", "removeWatermark": false, "aspectRatio": "Giữ nguyên" },
            "error": null
        }),
        "face-swap" => json!({
            "stage": "idle",
            "sourceImage": null,
            "targetImage": null,
            "generatedImage": null,
            "historicalImages": [],
            "options": { "notes": "", "removeWatermark": false },
            "error": null
        }),
        "id-photo-creator" => json!({
            "stage": "idle",
            "uploadedImage": null,
            "generatedImages": {},
            "historicalImages": [],
            "options": { "country": "", "size": "3x4", "outfit": "", "background": "Trắng", "notes": "", "removeWatermark": false },
            "error": null
        }),
        "object-remover" => json!({
            "stage": "idle",
            "uploadedImage": null,
            "maskImage": null,
            "generatedImage": null,
            "historicalImages": [],
            "options": { "notes": "", "removeWatermark": false },
            "error": null
        }),
        // 静态页面与未知id
        _ => json!({ "stage": "home" }),
    }
}

/// 为每个工具页面提供一致的状态契约，页面无需各自实现初始化。
pub struct ToolSession {
    tool_id: String,
    state: Value,
    back: Option<Box<dyn Fn() + Send + Sync>>,
}

impl ToolSession {
    pub fn new(tool_id: &str) -> Self {
        Self {
            tool_id: tool_id.to_string(),
            state: initial_state_for(tool_id),
            back: None,
        }
    }

    pub fn tool_id(&self) -> &str {
        &self.tool_id
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    /// 浅合并一个局部状态对象。不校验键名，保留既有键。
    /// 非对象的partial不产生任何效果。
    pub fn apply(&mut self, partial: &Value) {
        let Some(updates) = partial.as_object() else {
            return;
        };
        if !self.state.is_object() {
            self.state = Value::Object(Map::new());
        }
        let state = self.state.as_object_mut().expect("state is an object");
        for (key, value) in updates {
            state.insert(key.clone(), value.clone());
        }
    }

    /// 用全新的工具初始状态替换当前状态
    pub fn reset(&mut self) {
        self.state = initial_state_for(&self.tool_id);
    }

    /// 页面可以注入自己的返回导航
    pub fn set_back(&mut self, hook: Box<dyn Fn() + Send + Sync>) {
        self.back = Some(hook);
    }

    /// 默认是空操作，除非页面注入了导航钩子
    pub fn go_back(&self) {
        if let Some(hook) = &self.back {
            hook();
        }
    }
}
