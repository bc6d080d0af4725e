// One posting run: latest comic number -> random comic on disk -> wall
// post -> delete the image.

use crate::comic::{ComicClient, FetchedComic};
use crate::config::Settings;
use crate::errors::AppResult;
use crate::transport::Transport;
use crate::wall::{PostResult, WallClient};
use rand::Rng;
use std::path::Path;

/// Post one random comic to the configured group wall.
///
/// The image is saved in `work_dir` and deleted once the wall pipeline has
/// finished, whether it succeeded or not. A pipeline error takes precedence
/// over a failure to delete the file.
pub fn run<R: Rng>(
    settings: &Settings,
    transport: &dyn Transport,
    rng: &mut R,
    work_dir: &Path,
) -> AppResult<PostResult> {
    let comics = ComicClient::new(transport, &settings.comic_api_url);
    let latest = comics.latest_comic_number()?;
    let FetchedComic { metadata, image } = comics.fetch_random_comic(rng, latest, work_dir)?;

    let wall = WallClient::new(
        transport,
        &settings.wall_api_url,
        &settings.access_token,
        &settings.api_version,
    );
    let posted = wall.post_on_wall(
        settings.group_id,
        image.path(),
        metadata.caption.as_deref(),
    );
    let removed = image.remove();

    let post = posted?;
    removed?;
    Ok(post)
}
