//! Image fixtures and a mock sprite server

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sprite_pipeline::Config;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Path prefix the mock server serves sprites under
pub const ASSET_PREFIX: &str = "/assets";

/// Deterministic PNG for `index`: side length and color both derive from it
pub fn sprite_png(index: u32) -> Vec<u8> {
    let side = 8 + index % 8;
    let image = RgbImage::from_fn(side, side, |x, y| {
        Rgb([
            (index * 13 % 256) as u8,
            (x * 255 / side) as u8,
            (y * 255 / side) as u8,
        ])
    });
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("encode fixture png");
    bytes.into_inner()
}

/// Parse the index out of a request path like `/assets/007.png`
fn index_from_request(request: &Request) -> Option<u32> {
    request
        .url
        .path()
        .rsplit('/')
        .next()?
        .strip_suffix(".png")?
        .parse()
        .ok()
}

/// Start a server answering `GET /assets/NNN.png` with [`sprite_png`]
pub async fn start_sprite_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/assets/\d{3,}\.png$"))
        .respond_with(|request: &Request| match index_from_request(request) {
            Some(index) => ResponseTemplate::new(200)
                .insert_header("Content-Type", "image/png")
                .set_body_bytes(sprite_png(index)),
            None => ResponseTemplate::new(400),
        })
        .mount(&server)
        .await;
    server
}

/// Make one asset path answer with `status` instead of an image
pub async fn fail_asset(server: &MockServer, file_name: &str, status: u16) {
    Mock::given(method("GET"))
        .and(wiremock::matchers::path(format!("{ASSET_PREFIX}/{file_name}")))
        .respond_with(ResponseTemplate::new(status))
        .with_priority(1)
        .mount(server)
        .await;
}

/// Configuration rooted in `root`, fetching from `server`
pub fn pipeline_config(
    root: &Path,
    server: &MockServer,
    count: u32,
    range_workers: usize,
    pool_size: usize,
) -> Config {
    let mut config = Config::default();
    config.fetch.count = count;
    config.fetch.base_url = format!("{}{}", server.uri(), ASSET_PREFIX);
    config.fetch.dest_dir = root.join("pokemon_dataset");
    config.fetch.range_workers = range_workers;
    config.fetch.max_in_flight_per_range = 4;
    config.transform.dest_dir = root.join("pokemon_processed");
    config.transform.pool_size = pool_size;
    config.progress.poll_interval = std::time::Duration::from_millis(10);
    config
}

/// Sorted file names in `dir`
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| {
            entry
                .expect("dir entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

/// Expected names `001.png ..= NNN.png`
pub fn expected_names(count: u32) -> Vec<String> {
    (1..=count).map(|i| format!("{i:03}.png")).collect()
}
