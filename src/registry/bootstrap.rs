//! First-run initialisation of a mounted service root.

use std::io;
use std::path::Path;

use crate::assets;

/// Prepare `root` so it can serve as registry, image and compose directory.
///
/// Creates the directory, writes the bundled example registry as
/// `services.json` and copies bundled images. Existing files are left alone.
pub fn init_service_root(root: &Path) -> io::Result<()> {
    std::fs::create_dir_all(root)?;

    let services = root.join("services.json");
    if !services.exists() {
        if let Some(example) = assets::example_registry() {
            std::fs::write(&services, example.as_ref())?;
            tracing::info!("Initialized {} from bundled example", services.display());
        }
    }

    let images = root.join("images");
    std::fs::create_dir_all(&images)?;
    for name in assets::image_names() {
        let dest = images.join(&name);
        if dest.exists() {
            continue;
        }
        if let Some(data) = assets::image(&name) {
            std::fs::write(&dest, data.as_ref())?;
        }
    }

    Ok(())
}
