//! Logging setup for the queue session client.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// Both the session library (`qure_client`) and the binary are filtered at
/// `default_log_level`. The filter can be overridden with `RUST_LOG`.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "qure_client")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use qure_shared::logger::setup_logger;
///
/// setup_logger("qure_client", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directives(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

const LIBRARY_TARGETS: [&str; 2] = ["qure_client", "qure_shared"];

fn default_directives(binary_name: &str, default_log_level: &str) -> String {
    let binary_target = binary_name.replace('-', "_");
    let mut targets = LIBRARY_TARGETS.to_vec();
    if !targets.contains(&binary_target.as_str()) {
        targets.push(binary_target.as_str());
    }
    targets
        .iter()
        .map(|target| format!("{}={}", target, default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_skip_binary_named_like_library() {
        // テスト項目: バイナリ名がライブラリと同じ target になる場合は重複させない
        // given (前提条件):
        let binary_name = "qure-client";

        // when (操作):
        let directives = default_directives(binary_name, "debug");

        // then (期待する結果):
        assert_eq!(directives, "qure_client=debug,qure_shared=debug");
    }

    #[test]
    fn test_default_directives_cover_other_binary() {
        // テスト項目: 別名のバイナリは target として追加される
        // given (前提条件):
        let binary_name = "qure-admin";

        // when (操作):
        let directives = default_directives(binary_name, "info");

        // then (期待する結果):
        assert_eq!(directives, "qure_client=info,qure_shared=info,qure_admin=info");
    }
}
