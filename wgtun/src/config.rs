use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use wgtun_core::config::TunnelConfig;

const CONFIG_FILE_NAME: &str = "wgtun.toml";

pub fn default_config_path() -> Result<PathBuf> {
    let proj = ProjectDirs::from("io", "wgtun", "wgtun")
        .context("could not determine platform config directory")?;
    let dir = proj.config_dir();
    Ok(dir.join(CONFIG_FILE_NAME))
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory: {}", parent.display()))?;
    }
    Ok(())
}

pub fn load(path: &Path) -> Result<TunnelConfig> {
    if !path.exists() {
        return Ok(TunnelConfig::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let cfg: TunnelConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
    Ok(cfg)
}

pub fn save(path: &Path, cfg: &TunnelConfig, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        anyhow::bail!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    ensure_parent_dir(path)?;
    let raw = toml::to_string_pretty(cfg).context("failed to serialize config to TOML")?;
    fs::write(path, raw).with_context(|| format!("failed to write config: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let cfg = load(Path::new("/nonexistent/wgtun.toml")).expect("load failed");
        assert_eq!(cfg.listen_port, TunnelConfig::default().listen_port);
    }

    #[test]
    fn test_save_refuses_overwrite_without_force() {
        let dir = std::env::temp_dir().join(format!("wgtun-cfg-{}", std::process::id()));
        let path = dir.join("wgtun.toml");
        let cfg = TunnelConfig::default();

        save(&path, &cfg, false).expect("initial save failed");
        assert!(save(&path, &cfg, false).is_err());
        save(&path, &cfg, true).expect("forced save failed");

        let loaded = load(&path).expect("load failed");
        assert_eq!(loaded.session_id, cfg.session_id);
        let _ = fs::remove_dir_all(&dir);
    }
}
