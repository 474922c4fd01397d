use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub database_url: String,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: String,
    pub temp_root: PathBuf,
    pub mrl: MrlConfig,
    pub english: EnglishConfig,
}

/// Credentials and endpoints of the MRL web service, already narrowed to
/// either the production or the test set.
#[derive(Clone)]
pub struct MrlConfig {
    pub prod_mode: bool,
    pub user: String,
    pub password: String,
    pub login_url: String,
    pub report_url: String,
    pub login_timeout: Duration,
    pub report_timeout: Duration,
    pub accept_invalid_certs: bool,
    pub response_log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct EnglishConfig {
    pub render_url: String,
    pub render_timeout: Duration,
    pub share_root: PathBuf,
    pub share_subdirs: Vec<String>,
}

pub struct MrlCredentialSet {
    pub password: String,
    pub login_url: String,
    pub report_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let prod_mode = parse_bool(&env::var("MRL_PROD_MODE").unwrap_or_else(|_| "true".into()));

        let prod = MrlCredentialSet {
            password: env::var("MRL_PASS_PROD").unwrap_or_default(),
            login_url: env::var("MRL_LOGIN_URL_PROD").unwrap_or_default(),
            report_url: env::var("MRL_REPORTE_URL_PROD").unwrap_or_default(),
        };
        let test = MrlCredentialSet {
            password: env::var("MRL_PASS_TEST").unwrap_or_default(),
            login_url: env::var("MRL_LOGIN_URL_TEST").unwrap_or_default(),
            report_url: env::var("MRL_REPORTE_URL_TEST").unwrap_or_default(),
        };

        let mut mrl = MrlConfig::resolve(
            prod_mode,
            env::var("MRL_USER").unwrap_or_default(),
            prod,
            test,
        );
        mrl.accept_invalid_certs = parse_bool(
            &env::var("MRL_ACCEPT_INVALID_CERTS").unwrap_or_else(|_| "false".into()),
        );
        mrl.response_log_dir = env::var("MRL_RESPONSE_LOG_DIR").ok().map(PathBuf::from);

        Self {
            port: env::var("APP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("APP_PORT must be a number"),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            otel_service_name: env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "clink-reports".to_string()),
            otel_exporter_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            temp_root: env::var("TEMP_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join("clink")),
            mrl,
            english: EnglishConfig {
                render_url: env::var("ENGLISH_RENDER_URL").unwrap_or_default(),
                render_timeout: Duration::from_secs(300),
                share_root: env::var("ENGLISH_SHARE_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/mnt/laudos")),
                share_subdirs: parse_list(
                    &env::var("ENGLISH_SHARE_SUBDIRS")
                        .unwrap_or_else(|_| "ingles,ingles/firmados".to_string()),
                ),
            },
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl MrlConfig {
    /// Picks the production or test credential set once, at bootstrap.
    pub fn resolve(
        prod_mode: bool,
        user: String,
        prod: MrlCredentialSet,
        test: MrlCredentialSet,
    ) -> Self {
        let chosen = if prod_mode { prod } else { test };
        Self {
            prod_mode,
            user,
            password: chosen.password,
            login_url: chosen.login_url,
            report_url: chosen.report_url,
            login_timeout: Duration::from_secs(30),
            report_timeout: Duration::from_secs(120),
            accept_invalid_certs: false,
            response_log_dir: None,
        }
    }

    /// Value of the `TEST` column the compliance summary is keyed by.
    pub fn test_flag(&self) -> i32 {
        if self.prod_mode { 1 } else { 0 }
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for MrlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MrlConfig")
            .field("prod_mode", &self.prod_mode)
            .field("user", &self.user)
            .field("login_url", &self.login_url)
            .field("report_url", &self.report_url)
            .field("login_timeout", &self.login_timeout)
            .field("report_timeout", &self.report_timeout)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("response_log_dir", &self.response_log_dir)
            .finish_non_exhaustive()
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
