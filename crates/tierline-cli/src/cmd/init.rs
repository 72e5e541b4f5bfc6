use anyhow::Context;
use std::path::Path;
use tierline_core::{config::Config, db::Store, io, paths};

pub fn run(root: &Path) -> anyhow::Result<()> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    println!("Initializing tierline in: {}", root.display());

    let dir = paths::tierline_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    if !paths::config_path(root).exists() {
        Config::new(&project_name)
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    let store_path = paths::store_path(root);
    let existed = store_path.exists();
    Store::open(&store_path).context("failed to create store")?;
    if existed {
        println!("  exists:  {}", paths::STORE_FILE);
    } else {
        println!("  created: {}", paths::STORE_FILE);
    }

    println!("\nNext: tierline serve");
    Ok(())
}
