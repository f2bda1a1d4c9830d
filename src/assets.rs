//! Files bundled into the binary: the example registry and placeholder images.

use rust_embed::RustEmbed;
use std::borrow::Cow;

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Bundled;

const EXAMPLE_REGISTRY: &str = "config/services.example.json";

/// The bundled example service registry.
pub fn example_registry() -> Option<Cow<'static, [u8]>> {
    Bundled::get(EXAMPLE_REGISTRY).map(|f| f.data)
}

/// A bundled image by file name (relative to the images folder).
pub fn image(name: &str) -> Option<Cow<'static, [u8]>> {
    Bundled::get(&format!("images/{}", name)).map(|f| f.data)
}

/// Names of all bundled images.
pub fn image_names() -> Vec<String> {
    Bundled::iter()
        .filter_map(|path| path.strip_prefix("images/").map(str::to_string))
        .collect()
}
