// Comic fetcher: reads the xkcd JSON API, picks a random comic and
// downloads its image next to the working directory.

use crate::errors::{AppError, AppResult};
use crate::image_file::DownloadedImage;
use crate::transport::Transport;
use rand::Rng;
use reqwest::Url;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_COMIC_API_URL: &str = "https://xkcd.com";

const MAX_FILE_NAME_LEN: usize = 255;

/// Metadata of one comic. `caption` is the comic's alt text, which some
/// comics don't have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComicMetadata {
    pub number: u32,
    pub image_url: String,
    pub caption: Option<String>,
}

/// A comic whose image is on disk.
#[derive(Debug)]
pub struct FetchedComic {
    pub metadata: ComicMetadata,
    pub image: DownloadedImage,
}

impl FetchedComic {
    pub fn caption(&self) -> Option<&str> {
        self.metadata.caption.as_deref()
    }
}

#[derive(Deserialize)]
struct LatestComic {
    num: u32,
}

#[derive(Deserialize)]
struct ComicDocument {
    img: String,
    #[serde(default)]
    alt: Option<String>,
}

/// Client for the comic service.
pub struct ComicClient<'a> {
    transport: &'a dyn Transport,
    base_url: String,
}

impl<'a> ComicClient<'a> {
    pub fn new(transport: &'a dyn Transport, base_url: &str) -> Self {
        ComicClient {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Number of the newest comic, which is also the highest valid id.
    pub fn latest_comic_number(&self) -> AppResult<u32> {
        let url = format!("{}/info.0.json", self.base_url);
        let body = self.transport.get_json(&url, &[])?;
        let latest: LatestComic =
            serde_json::from_value(body).map_err(|e| AppError::schema(&url, e.to_string()))?;
        if latest.num == 0 {
            return Err(AppError::schema(&url, "latest comic number is 0"));
        }
        Ok(latest.num)
    }

    pub fn metadata(&self, number: u32) -> AppResult<ComicMetadata> {
        let url = format!("{}/{}/info.0.json", self.base_url, number);
        let body = self.transport.get_json(&url, &[])?;
        let doc: ComicDocument =
            serde_json::from_value(body).map_err(|e| AppError::schema(&url, e.to_string()))?;
        Ok(ComicMetadata {
            number,
            image_url: doc.img,
            caption: doc.alt,
        })
    }

    /// Fetch comic `number` and save its image into `dir`.
    ///
    /// The image is downloaded completely before the file is created, so a
    /// failed download leaves nothing on disk.
    pub fn fetch_comic(&self, number: u32, dir: &Path) -> AppResult<FetchedComic> {
        let metadata = self.metadata(number)?;
        let file_name = comic_file_name(&metadata.image_url)?;

        let bytes = self.transport.get_bytes(&metadata.image_url)?;
        let image = DownloadedImage::write(dir.join(&file_name), &bytes)?;
        log::info!("Saved comic #{} as {}", number, file_name);

        Ok(FetchedComic { metadata, image })
    }

    /// Fetch a comic drawn uniformly from `1..=upper_bound`.
    pub fn fetch_random_comic<R: Rng>(
        &self,
        rng: &mut R,
        upper_bound: u32,
        dir: &Path,
    ) -> AppResult<FetchedComic> {
        let number = pick_comic_number(rng, upper_bound)?;
        log::info!("Picked comic #{} of {}", number, upper_bound);
        self.fetch_comic(number, dir)
    }
}

pub fn pick_comic_number<R: Rng>(rng: &mut R, upper_bound: u32) -> AppResult<u32> {
    if upper_bound == 0 {
        return Err(AppError::Config(
            "comic upper bound must be at least 1".into(),
        ));
    }
    Ok(rng.random_range(1..=upper_bound))
}

/// Local file name for an image URL: the last segment of its path.
///
/// Names that could escape the working directory or clobber hidden files
/// are rejected.
pub fn comic_file_name(image_url: &str) -> AppResult<String> {
    let url = Url::parse(image_url)
        .map_err(|_| AppError::invalid_file_name(image_url, "not a valid URL"))?;
    let name = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .ok_or_else(|| AppError::invalid_file_name(image_url, "URL path has no file name"))?;

    if name.starts_with('.') {
        return Err(AppError::invalid_file_name(image_url, "hidden or relative name"));
    }
    if name.contains(['%', '\\', ':', '\0']) {
        return Err(AppError::invalid_file_name(image_url, "unsafe characters in name"));
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(AppError::invalid_file_name(image_url, "name too long"));
    }
    Ok(name.to_string())
}
