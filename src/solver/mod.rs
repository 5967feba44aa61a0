//! Signature and n-parameter deciphering.
//!
//! The AST solver is preferred; the structural regex solver is attempted
//! only when the AST solver fails outright. When neither reaches the ready
//! state both transforms degrade to the identity function — several clients
//! return directly usable URLs, so this is a working configuration.

mod ejs;
mod regex;
mod stubs;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

pub use self::ejs::EjsSolver;
pub use self::regex::RegexSolver;

use crate::js::JsSandbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveSolver {
    None,
    Ejs,
    Regex,
}

pub struct SigDecipherer {
    ejs: EjsSolver,
    regex: RegexSolver,
    active: ActiveSolver,
    /// Input -> output memo for n transforms. Values are functional per
    /// player, and remembering outputs keeps a second pass over an
    /// already-transformed value from scrambling it again.
    n_cache: Mutex<HashMap<String, String>>,
}

impl SigDecipherer {
    pub fn new(sandbox: Arc<JsSandbox>) -> Self {
        Self {
            ejs: EjsSolver::new(sandbox.clone()),
            regex: RegexSolver::new(sandbox),
            active: ActiveSolver::None,
            n_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Try to bring a solver up for this player. Failure is non-fatal: the
    /// decipherer stays in identity mode.
    pub async fn load_player(&mut self, player_code: &str, player_id: &str) -> bool {
        self.active = ActiveSolver::None;
        self.n_cache.lock().clear();

        if self.ejs.load_player(player_code, player_id).await {
            info!("[jsc:ejs] solving JS challenges using the AST solver");
            self.active = ActiveSolver::Ejs;
            return true;
        }

        if self.regex.load_player(player_code).await {
            info!("[jsc:regex] solving JS challenges using the structural solver");
            self.active = ActiveSolver::Regex;
            return true;
        }

        warn!("no JS solver available; signatures and n parameters pass through unchanged");
        false
    }

    pub fn is_ready(&self) -> bool {
        self.active != ActiveSolver::None
    }

    /// Decipher an `s` challenge. Identity when no solver is ready.
    pub async fn decipher_signature(&self, signature: &str) -> String {
        match self.active {
            ActiveSolver::Ejs => self.ejs.solve_sig(signature).await,
            ActiveSolver::Regex => self.regex.solve_sig(signature).await,
            ActiveSolver::None => signature.to_string(),
        }
    }

    /// Transform an `n` challenge. Identity when no solver is ready.
    /// Memoized per player: feeding a previously produced output back in
    /// returns it unchanged.
    pub async fn transform_n(&self, n: &str) -> String {
        {
            let cache = self.n_cache.lock();
            if let Some(out) = cache.get(n) {
                return out.clone();
            }
            if cache.values().any(|v| v == n) {
                return n.to_string();
            }
        }

        let out = match self.active {
            ActiveSolver::Ejs => self.ejs.solve_n(n).await,
            ActiveSolver::Regex => self.regex.solve_n(n).await,
            ActiveSolver::None => n.to_string(),
        };

        self.n_cache
            .lock()
            .insert(n.to_string(), out.clone());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_until_a_solver_loads() {
        let decipherer = SigDecipherer::new(Arc::new(JsSandbox::new()));
        assert!(!decipherer.is_ready());
        assert_eq!(decipherer.decipher_signature("abc").await, "abc");
        assert_eq!(decipherer.transform_n("xyz").await, "xyz");
    }

    #[tokio::test]
    async fn falls_back_to_regex_solver() {
        let player = r#"
        (function(g) {
            sig=function(a){a=a.split("");a.reverse();return a.join("")};
            ntr=function(b){var c=b.split("");c.reverse();return c.join("")};
        })(this);
        "#;

        std::env::set_var("YTDLPP_EJS_BUNDLE", "/nonexistent/ejs.bundle.js");
        let mut decipherer = SigDecipherer::new(Arc::new(JsSandbox::new()));
        assert!(decipherer.load_player(player, "deadbeef").await);
        assert!(decipherer.is_ready());
        assert_eq!(decipherer.decipher_signature("abc").await, "cba");
        std::env::remove_var("YTDLPP_EJS_BUNDLE");
    }

    #[tokio::test]
    async fn n_transform_is_idempotent_across_passes() {
        let player = r#"
        (function(g) {
            sig=function(a){a=a.split("");return a.join("")};
            ntr=function(b){var c=b.split("");c.reverse();return c.join("")};
        })(this);
        "#;

        std::env::set_var("YTDLPP_EJS_BUNDLE", "/nonexistent/ejs.bundle.js");
        let mut decipherer = SigDecipherer::new(Arc::new(JsSandbox::new()));
        assert!(decipherer.load_player(player, "cafebabe").await);

        let once = decipherer.transform_n("abcdef").await;
        assert_eq!(once, "fedcba");
        // A second pass over the already-transformed value is a no-op.
        assert_eq!(decipherer.transform_n(&once).await, once);
        // And the original still maps to the same output.
        assert_eq!(decipherer.transform_n("abcdef").await, once);
        std::env::remove_var("YTDLPP_EJS_BUNDLE");
    }
}
