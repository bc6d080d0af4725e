use crate::comic::DEFAULT_COMIC_API_URL;
use crate::errors::{AppError, AppResult};
use crate::wall::DEFAULT_WALL_API_URL;
use serde::Deserialize;
use std::fmt;

/// Everything the poster needs to know, read once at startup.
#[derive(Clone)]
pub struct Settings {
    pub group_id: u64,
    pub access_token: String,
    pub api_version: String,
    pub comic_api_url: String,
    pub wall_api_url: String,
}

/// `VK_GROUP_ID`, `VK_ACCESS_TOKEN`, `VK_VERSION_API`
#[derive(Deserialize)]
struct VkVars {
    group_id: u64,
    access_token: String,
    version_api: String,
}

#[derive(Deserialize)]
struct EndpointVars {
    #[serde(default = "default_comic_api_url")]
    comic_api_url: String,
    #[serde(default = "default_wall_api_url")]
    wall_api_url: String,
}

fn default_comic_api_url() -> String {
    DEFAULT_COMIC_API_URL.to_string()
}

fn default_wall_api_url() -> String {
    DEFAULT_WALL_API_URL.to_string()
}

impl Settings {
    /// Load `.env` (if any) and read settings from the process environment.
    pub fn from_env() -> AppResult<Self> {
        if let Err(e) = dotenv::dotenv() {
            if !e.not_found() {
                log::warn!("Ignoring unreadable .env file: {}", e);
            }
        }
        Self::from_vars(std::env::vars())
    }

    /// Build settings from explicit `(name, value)` pairs.
    pub fn from_vars<I>(vars: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();
        let vk: VkVars = envy::prefixed("VK_").from_iter(vars.clone())?;
        let endpoints: EndpointVars = envy::from_iter(vars)?;

        if vk.access_token.trim().is_empty() {
            return Err(AppError::Config("VK_ACCESS_TOKEN is empty".into()));
        }
        if vk.version_api.trim().is_empty() {
            return Err(AppError::Config("VK_VERSION_API is empty".into()));
        }

        Ok(Settings {
            group_id: vk.group_id,
            access_token: vk.access_token,
            api_version: vk.version_api,
            comic_api_url: endpoints.comic_api_url,
            wall_api_url: endpoints.wall_api_url,
        })
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("group_id", &self.group_id)
            .field("access_token", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("comic_api_url", &self.comic_api_url)
            .field("wall_api_url", &self.wall_api_url)
            .finish()
    }
}
