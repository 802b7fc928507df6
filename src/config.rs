use crate::error::{CompressError, CompressResult};

/// Default location of the engine's script and binary payloads.
pub const DEFAULT_ASSET_BASE_URL: &str = "https://unpkg.com/@ffmpeg/core@0.12.6/dist/umd";

pub const DEFAULT_INPUT_NAME: &str = "input.mp4";
pub const DEFAULT_OUTPUT_NAME: &str = "output.mp4";
pub const OUTPUT_MIME: &str = "video/mp4";

/// The two assets an engine needs to finish loading.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct EngineAssets {
    pub core_url: String,
    pub wasm_url: String,
}

impl EngineAssets {
    pub fn from_base(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            core_url: format!("{base}/ffmpeg-core.js"),
            wasm_url: format!("{base}/ffmpeg-core.wasm"),
        }
    }
}

impl Default for EngineAssets {
    fn default() -> Self {
        Self::from_base(DEFAULT_ASSET_BASE_URL)
    }
}

/// Fixed parameters of a compression job.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct CompressConfig {
    /// Name the input bytes are written under in engine storage.
    pub input_name: String,
    /// Name the engine writes its result under.
    pub output_name: String,
    pub output_mime: String,
    pub assets: EngineAssets,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            input_name: DEFAULT_INPUT_NAME.to_string(),
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
            output_mime: OUTPUT_MIME.to_string(),
            assets: EngineAssets::default(),
        }
    }
}

impl CompressConfig {
    pub fn validate(&self) -> CompressResult<()> {
        for (what, name) in [("input", &self.input_name), ("output", &self.output_name)] {
            if name.is_empty() {
                return Err(CompressError::user_input(format!(
                    "{what} file name must be non-empty"
                )));
            }
            if name.contains(['/', '\\']) {
                return Err(CompressError::user_input(format!(
                    "{what} file name '{name}' must not contain path separators"
                )));
            }
        }
        if self.input_name == self.output_name {
            return Err(CompressError::user_input(
                "input and output file names must differ",
            ));
        }
        if self.assets.core_url.is_empty() || self.assets.wasm_url.is_empty() {
            return Err(CompressError::user_input("engine asset urls must be set"));
        }
        Ok(())
    }

    /// `-i <input> -vcodec libx264 -crf 28 -preset ultrafast <output>`
    pub fn transcode_args(&self) -> Vec<String> {
        [
            "-i",
            self.input_name.as_str(),
            "-vcodec",
            "libx264",
            "-crf",
            "28",
            "-preset",
            "ultrafast",
            self.output_name.as_str(),
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }
}
