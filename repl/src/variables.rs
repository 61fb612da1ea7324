use std::time::Duration;

use urlmacro_core::Registry;
use urlmacro_core::builtins;
use urlmacro_core::resolver::arg;

/// Registry used by the REPL: the built-ins plus a few macros that only make
/// sense on a command line.
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    builtins::register(&mut registry);

    registry
        .set("ENV", |args| Ok(std::env::var(arg(args, 0)).ok().into()))
        // Resolves after a pause; handy for watching async ordering.
        .set_async("DELAY", |args: Vec<String>| async move {
            let millis = arg(&args, 0).trim().parse::<u64>().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(arg(&args, 1).into())
        });
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use urlmacro_core::VariableSource;

    #[test]
    fn test_registry_has_builtins_and_cli_macros() {
        let registry = registry();
        for name in ["ENV", "DELAY", "$CALC", "TIMESTAMP"] {
            assert!(registry.contains(name), "missing {}", name);
        }
        assert!(registry.get("DELAY").unwrap().sync.is_none());
    }
}
