use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, num::NonZeroU32};

const DEFAULT_PAGE_SIZE: u32 = 4;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub blob_dir: String,
    pub blob_container: String,
    pub public_base_url: String,
    pub page_size: NonZeroU32,
    pub max_upload_bytes: usize,
}

/// One-shot actions requested on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartupFlags {
    pub migrate: bool,
    pub seed: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Movie catalog service")]
pub struct Args {
    /// Host to bind to (overrides MOVIE_CATALOG_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides MOVIE_CATALOG_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides MOVIE_CATALOG_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory holding blob containers (overrides MOVIE_CATALOG_BLOB_DIR)
    #[arg(long)]
    pub blob_dir: Option<String>,

    /// Container images are stored in (overrides MOVIE_CATALOG_BLOB_CONTAINER)
    #[arg(long)]
    pub blob_container: Option<String>,

    /// Public prefix of image URIs (overrides MOVIE_CATALOG_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Movies per list page (overrides MOVIE_CATALOG_PAGE_SIZE)
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Largest accepted create/edit request body (overrides MOVIE_CATALOG_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Insert sample movies into an empty catalog before serving
    #[arg(long)]
    pub seed: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and startup flags.
    pub fn from_env_and_args() -> Result<(Self, StartupFlags)> {
        Self::resolve(Args::parse(), |name| env::var(name))
    }

    /// Merge `args` over the variables `lookup` yields over defaults.
    pub fn resolve(
        args: Args,
        lookup: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<(Self, StartupFlags)> {
        let text = |name: &str, default: &str| -> Result<String> {
            match lookup(name) {
                Ok(value) => Ok(value),
                Err(env::VarError::NotPresent) => Ok(default.to_string()),
                Err(err) => Err(err).with_context(|| format!("reading {}", name)),
            }
        };

        // --- Environment fallback ---
        let env_host = text("MOVIE_CATALOG_HOST", "0.0.0.0")?;
        let env_port: u16 = parse_env(&text("MOVIE_CATALOG_PORT", "3000")?, "MOVIE_CATALOG_PORT")?;
        let env_db = text("MOVIE_CATALOG_DATABASE_URL", "sqlite://./data/meta/movies.db")?;
        let env_blob_dir = text("MOVIE_CATALOG_BLOB_DIR", "./data/blobs")?;
        let env_container = text("MOVIE_CATALOG_BLOB_CONTAINER", "files")?;
        let env_base_url = text(
            "MOVIE_CATALOG_PUBLIC_BASE_URL",
            "http://127.0.0.1:3000/blobs",
        )?;
        let env_page_size: u32 = parse_env(
            &text("MOVIE_CATALOG_PAGE_SIZE", &DEFAULT_PAGE_SIZE.to_string())?,
            "MOVIE_CATALOG_PAGE_SIZE",
        )?;
        let env_max_upload: usize = parse_env(
            &text(
                "MOVIE_CATALOG_MAX_UPLOAD_BYTES",
                &DEFAULT_MAX_UPLOAD_BYTES.to_string(),
            )?,
            "MOVIE_CATALOG_MAX_UPLOAD_BYTES",
        )?;

        // --- Merge ---
        let page_size = args.page_size.unwrap_or(env_page_size);
        let Some(page_size) = NonZeroU32::new(page_size) else {
            bail!("page size must be at least 1");
        };
        let blob_container = args.blob_container.unwrap_or(env_container);
        if blob_container.is_empty() || blob_container.contains(['/', '\\', '.']) {
            bail!("blob container `{}` must be a single path segment", blob_container);
        }

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            blob_dir: args.blob_dir.unwrap_or(env_blob_dir),
            blob_container,
            public_base_url: args.public_base_url.unwrap_or(env_base_url),
            page_size,
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
        };
        let flags = StartupFlags {
            migrate: args.migrate,
            seed: args.seed,
        };

        Ok((cfg, flags))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T>(value: &str, name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("parsing {} value `{}`", name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Result<String, env::VarError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned().ok_or(env::VarError::NotPresent)
    }

    #[test]
    fn defaults_apply_without_env_or_args() {
        let (cfg, flags) = AppConfig::resolve(Args::default(), lookup(&[])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.page_size.get(), 4);
        assert_eq!(cfg.blob_container, "files");
        assert_eq!(cfg.max_upload_bytes, 10 * 1024 * 1024);
        assert!(!flags.migrate && !flags.seed);
    }

    #[test]
    fn args_override_env() {
        let args = Args {
            port: Some(8080),
            page_size: Some(3),
            seed: true,
            ..Default::default()
        };
        let env = lookup(&[
            ("MOVIE_CATALOG_PORT", "9000"),
            ("MOVIE_CATALOG_HOST", "127.0.0.1"),
            ("MOVIE_CATALOG_PAGE_SIZE", "10"),
        ]);
        let (cfg, flags) = AppConfig::resolve(args, env).unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:8080");
        assert_eq!(cfg.page_size.get(), 3);
        assert!(flags.seed);
    }

    #[test]
    fn malformed_port_is_reported() {
        let err = AppConfig::resolve(Args::default(), lookup(&[("MOVIE_CATALOG_PORT", "http")]))
            .unwrap_err();
        assert!(format!("{err:#}").contains("MOVIE_CATALOG_PORT"));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let args = Args {
            page_size: Some(0),
            ..Default::default()
        };
        assert!(AppConfig::resolve(args, lookup(&[])).is_err());
    }

    #[test]
    fn nested_container_is_rejected() {
        let env = lookup(&[("MOVIE_CATALOG_BLOB_CONTAINER", "a/b")]);
        assert!(AppConfig::resolve(Args::default(), env).is_err());
    }
}
