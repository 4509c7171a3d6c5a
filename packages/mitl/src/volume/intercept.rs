//! Command interception for Node-family projects.
//!
//! Invocations of npm and yarn are rewritten to funnel through pnpm, whose
//! content-addressed store is what the volume manager persists. The rewrite
//! table is closed: a lookup on the first argv token with a secondary switch
//! on the second. Rewritten commands are wrapped in a single `sh -lc`
//! invocation so the runtime never needs to understand the rewrite.

use tracing::trace;

/// Activates the managed pnpm shim before the rewritten command runs.
const COREPACK_PREPARE: &str = "corepack prepare pnpm@latest --activate";

/// Rewrite an npm or yarn invocation to run through pnpm.
///
/// Commands already targeting pnpm, and anything outside the rewrite table,
/// pass through untouched; the leading-token check makes the rewrite
/// idempotent.
pub fn intercept_node_command(argv: &[String]) -> Vec<String> {
    let Some(first) = argv.first() else {
        return argv.to_vec();
    };
    if first.contains("pnpm") {
        return argv.to_vec();
    }

    let rest = |from: usize| argv[from..].join(" ");
    let shimmed = match (first.as_str(), argv.get(1).map(String::as_str)) {
        // `npm ci` wants a reproducible install; fall back when the
        // lockfile predates pnpm. Built fully shimmed here: shim() would
        // also prefix the second `pnpm ` token in the fallback chain.
        ("npm", Some("ci")) => {
            "corepack pnpm install --frozen-lockfile || pnpm install --no-frozen-lockfile"
                .to_string()
        }
        ("npm", Some("install" | "i")) => shim(join_nonempty("pnpm install", &rest(2))),
        ("npm", Some("run")) => shim(join_nonempty("pnpm run", &rest(2))),
        ("npm", Some("test")) => shim(join_nonempty("pnpm test", &rest(2))),
        ("npm", Some(other)) => shim(join_nonempty(&format!("pnpm {other}"), &rest(2))),
        ("npm", None) => "pnpm".to_string(),
        ("yarn", Some("add")) => shim(join_nonempty("pnpm add", &rest(2))),
        ("yarn", Some("remove")) => shim(join_nonempty("pnpm remove", &rest(2))),
        ("yarn", Some("install") | None) => shim("pnpm install".to_string()),
        _ => return argv.to_vec(),
    };

    let script = format!("{COREPACK_PREPARE} && {shimmed}");
    trace!(original = ?argv, %script, "intercepted node command");
    vec!["sh".to_string(), "-lc".to_string(), script]
}

/// Route a pnpm invocation through the corepack shim.
fn shim(rewritten: String) -> String {
    rewritten.replace("pnpm ", "corepack pnpm ")
}

fn join_nonempty(command: &str, rest: &str) -> String {
    if rest.is_empty() {
        command.to_string()
    } else {
        format!("{command} {rest}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn npm_ci_gets_the_frozen_lockfile_fallback() {
        let result = intercept_node_command(&argv(&["npm", "ci"]));
        assert_eq!(result.len(), 3);
        assert_eq!(result[0], "sh");
        assert_eq!(result[1], "-lc");
        assert!(result[2].contains("corepack prepare pnpm@latest --activate"));
        assert!(result[2].contains(
            "pnpm install --frozen-lockfile || pnpm install --no-frozen-lockfile"
        ));
        assert_eq!(
            result[2],
            "corepack prepare pnpm@latest --activate && \
             corepack pnpm install --frozen-lockfile || pnpm install --no-frozen-lockfile"
        );
    }

    #[test_case(&["npm", "install"], "corepack pnpm install"; "npm_install")]
    #[test_case(&["npm", "i"], "corepack pnpm install"; "npm_i")]
    #[test_case(&["npm", "install", "--save-dev", "vitest"], "corepack pnpm install --save-dev vitest"; "npm_install_args")]
    #[test_case(&["npm", "run", "build"], "corepack pnpm run build"; "npm_run")]
    #[test_case(&["npm", "test"], "corepack pnpm test"; "npm_test")]
    #[test_case(&["npm", "audit"], "corepack pnpm audit"; "npm_other")]
    #[test_case(&["yarn", "add", "react", "react-dom"], "corepack pnpm add react react-dom"; "yarn_add")]
    #[test_case(&["yarn", "remove", "lodash"], "corepack pnpm remove lodash"; "yarn_remove")]
    #[test_case(&["yarn", "install"], "corepack pnpm install"; "yarn_install")]
    #[test_case(&["yarn"], "corepack pnpm install"; "yarn_bare")]
    #[test]
    fn rewrites_end_with(original: &[&str], expected_suffix: &str) {
        let result = intercept_node_command(&argv(original));
        pretty_assertions::assert_eq!(result[..2], argv(&["sh", "-lc"]));
        pretty_assertions::assert_eq!(
            result[2],
            format!("{COREPACK_PREPARE} && {expected_suffix}")
        );
    }

    #[test_case(&["pnpm", "install"]; "pnpm_untouched")]
    #[test_case(&["corepack", "pnpm", "install"]; "corepack_untouched")]
    #[test_case(&["node", "server.js"]; "node_untouched")]
    #[test_case(&["sh", "-lc", "corepack pnpm install"]; "already_wrapped")]
    #[test_case(&[]; "empty")]
    #[test]
    fn passes_through(original: &[&str]) {
        let original = argv(original);
        pretty_assertions::assert_eq!(intercept_node_command(&original), original);
    }

    #[test]
    fn interception_is_idempotent() {
        let once = intercept_node_command(&argv(&["npm", "ci"]));
        let twice = intercept_node_command(&once);
        assert_eq!(once, twice);
    }
}
