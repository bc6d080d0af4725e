// Library root
// ------------
// Posts a random xkcd comic to a VK group wall. The binary (`main.rs`)
// only parses flags, sets up logging and calls `app::run`.
//
// Module responsibilities:
// - `transport`: blocking HTTP behind the `Transport` trait.
// - `comic`: picks a random comic and downloads its image.
// - `wall`: the upload -> save -> post chain against the VK API.
// - `image_file`: owns the downloaded image and deletes it exactly once.
// - `config`: settings from `.env` and the environment.
// - `errors`: the error type shared by all of the above.
// - `testing`: a scripted `Transport` for tests.
pub mod app;
pub mod comic;
pub mod config;
pub mod errors;
pub mod image_file;
pub mod testing;
pub mod transport;
pub mod wall;

pub use config::Settings;
pub use errors::{AppError, AppResult};
