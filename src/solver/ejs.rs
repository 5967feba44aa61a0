//! AST-based solver driving the yt-dlp/ejs challenge-solver bundle.
//!
//! The bundle (meriyah parser + solver core) is loaded into the sandbox once
//! per sandbox. Each player script is preprocessed exactly once — an opaque
//! handle kept in a sandbox global, keyed by the player id — and signature/n
//! challenges are then solved in single shots against that handle.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::js::JsSandbox;

const LOADED_FLAG: &str = "_ytdlpp_ejs_loaded";
const PREPROCESSED_GLOBAL: &str = "_preprocessed_player";
const PLAYER_ID_GLOBAL: &str = "_loaded_player_id";

pub struct EjsSolver {
    sandbox: Arc<JsSandbox>,
    bundle_loaded: bool,
    ready: bool,
}

impl EjsSolver {
    pub fn new(sandbox: Arc<JsSandbox>) -> Self {
        Self {
            sandbox,
            bundle_loaded: false,
            ready: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Where the solver bundle lives: explicit override, then the cache dir.
    fn bundle_path() -> PathBuf {
        if let Some(path) = std::env::var_os("YTDLPP_EJS_BUNDLE") {
            return PathBuf::from(path);
        }
        crate::youtube::player_script::cache_dir().join("ejs.bundle.js")
    }

    async fn ensure_bundle_loaded(&mut self) -> bool {
        if self.bundle_loaded {
            return true;
        }

        let path = Self::bundle_path();
        let bundle = match std::fs::read_to_string(&path) {
            Ok(bundle) if !bundle.is_empty() => bundle,
            Ok(_) => {
                warn!("EJS solver bundle at {} is empty", path.display());
                return false;
            }
            Err(e) => {
                debug!("no EJS solver bundle at {} ({e})", path.display());
                return false;
            }
        };

        debug!("loading EJS solver bundle ({} bytes)", bundle.len());
        let guarded = format!(
            "if (!globalThis.{LOADED_FLAG}) {{ {bundle}; globalThis.{LOADED_FLAG} = true; }}"
        );
        match self.sandbox.eval(guarded).await {
            Ok(()) => {
                self.bundle_loaded = true;
                true
            }
            Err(e) => {
                warn!("failed to load EJS solver bundle: {e}");
                false
            }
        }
    }

    /// Preprocess a player. Re-loading the same `player_id` is a no-op after
    /// a cheap probe of the sandbox-side cache.
    pub async fn load_player(&mut self, player_code: &str, player_id: &str) -> bool {
        self.ready = false;

        if !self.ensure_bundle_loaded().await {
            return false;
        }

        if !player_id.is_empty() {
            let probe = format!("String(globalThis.{PLAYER_ID_GLOBAL} === '{player_id}')");
            if let Ok(cached) = self.sandbox.eval_to_string(probe).await {
                if cached == "true" {
                    debug!("EJS solver reusing preprocessed player {player_id}");
                    self.ready = true;
                    return true;
                }
            }
        }

        let input = json!({
            "type": "player",
            "player": player_code,
            "requests": [],
            "output_preprocessed": true,
        });
        let call = format!("JSON.stringify(jsc({input}))");

        let raw = match self.sandbox.eval_to_string(call).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!("EJS preprocessing failed: {e}");
                return false;
            }
        };

        let output: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                debug!("EJS preprocessing returned unparsable output: {e}");
                return false;
            }
        };
        if output.get("type").and_then(|t| t.as_str()) == Some("error") {
            debug!(
                "EJS solver error: {}",
                output
                    .get("error")
                    .and_then(|e| e.as_str())
                    .unwrap_or("unknown")
            );
            return false;
        }

        let Some(preprocessed) = output.get("preprocessed_player") else {
            debug!("EJS preprocessing produced no handle");
            return false;
        };

        let mut store = format!("globalThis.{PREPROCESSED_GLOBAL} = {preprocessed};");
        if !player_id.is_empty() {
            store.push_str(&format!("globalThis.{PLAYER_ID_GLOBAL} = '{player_id}';"));
        }
        if self.sandbox.eval(store).await.is_err() {
            return false;
        }

        info!("EJS solver ready (player {player_id})");
        self.ready = true;
        true
    }

    pub async fn solve_sig(&self, signature: &str) -> String {
        self.solve("sig", signature).await
    }

    pub async fn solve_n(&self, n: &str) -> String {
        self.solve("n", n).await
    }

    /// One-shot request against the preprocessed handle; identity on any
    /// failure.
    async fn solve(&self, kind: &str, challenge: &str) -> String {
        if !self.ready {
            return challenge.to_string();
        }

        let input = json!({
            "type": "preprocessed",
            "requests": [{ "type": kind, "challenges": [challenge] }],
        });
        let call = format!(
            "(function() {{ \
               var input = {input}; \
               input.preprocessed_player = globalThis.{PREPROCESSED_GLOBAL}; \
               return JSON.stringify(jsc(input)); \
             }})()"
        );

        let raw = match self.sandbox.eval_to_string(call).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!("EJS {kind} solve failed: {e}");
                return challenge.to_string();
            }
        };

        let output: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(_) => return challenge.to_string(),
        };

        output
            .get("responses")
            .and_then(|r| r.as_array())
            .and_then(|r| r.first())
            .and_then(|r| r.get("data"))
            .and_then(|d| d.get(challenge))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| challenge.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A miniature stand-in for the real bundle, honoring the jsc protocol:
    /// preprocessing records the player, solves reverse sig challenges and
    /// uppercase n challenges.
    const FAKE_BUNDLE: &str = r#"
        function jsc(input) {
            if (input.type === "player") {
                return { type: "result", preprocessed_player: "pp:" + input.player.length };
            }
            if (input.type === "preprocessed") {
                var req = input.requests[0];
                var data = {};
                for (var i = 0; i < req.challenges.length; i++) {
                    var c = req.challenges[i];
                    data[c] = req.type === "sig"
                        ? c.split("").reverse().join("")
                        : c.toUpperCase();
                }
                return { type: "result", responses: [{ type: "result", data: data }] };
            }
            return { type: "error", error: "bad input" };
        }
    "#;

    async fn solver_with_fake_bundle() -> EjsSolver {
        let sandbox = Arc::new(JsSandbox::new());
        sandbox.eval(FAKE_BUNDLE).await.unwrap();
        sandbox
            .eval(format!("globalThis.{LOADED_FLAG} = true;"))
            .await
            .unwrap();
        let mut solver = EjsSolver::new(sandbox);
        solver.bundle_loaded = true;
        solver
    }

    #[tokio::test]
    async fn preprocesses_and_solves() {
        let mut solver = solver_with_fake_bundle().await;
        assert!(solver.load_player("var x = 1;", "abc123").await);
        assert_eq!(solver.solve_sig("abcd").await, "dcba");
        assert_eq!(solver.solve_n("xy").await, "XY");
    }

    #[tokio::test]
    async fn reload_of_same_player_is_a_noop() {
        let mut solver = solver_with_fake_bundle().await;
        assert!(solver.load_player("var x = 1;", "abc123").await);
        // Break jsc; the cached-player probe must short-circuit before it.
        solver
            .sandbox
            .eval("jsc = function() { throw new Error('must not be called'); };")
            .await
            .unwrap();
        assert!(solver.load_player("var x = 1;", "abc123").await);
    }

    #[tokio::test]
    async fn missing_bundle_reports_unavailable() {
        std::env::set_var("YTDLPP_EJS_BUNDLE", "/nonexistent/ejs.bundle.js");
        let sandbox = Arc::new(JsSandbox::new());
        let mut solver = EjsSolver::new(sandbox);
        assert!(!solver.load_player("var x = 1;", "abc123").await);
        assert_eq!(solver.solve_sig("s").await, "s");
        std::env::remove_var("YTDLPP_EJS_BUNDLE");
    }
}
