// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use crate::config::BehaviorConfig;
use crate::dynamic::DynamicError;
use crate::dynamic::host;
use crate::grammar::Prose;
use crate::scheduling::parse_schedule;
use dimsum_common::model::EntityKey;
use rhai::{AST, CallFnOptions, Dynamic, Engine, EvalAltResult, FnPtr, Map, Scope};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use strum::{Display, EnumString};
use tracing::{debug, info};

/// When a language handler is offered to the parser, relative to the entity that registered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Condition {
    Always,
    Held,
    Ground,
    Worn,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LanguageHandler {
    pub prose: Prose,
    pub handler: String,
    pub condition: Condition,
}

/// Everything one script registered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Handlers {
    pub language: Vec<LanguageHandler>,
    /// Event name and handler.
    pub received: Vec<(String, String)>,
    /// Cron spec and handler.
    pub crons: Vec<(String, String)>,
    /// Hook name and handler.
    pub hooks: Vec<(String, String)>,
    /// Only this script's language handlers apply; the built-in verbs are skipped.
    pub replace_grammar: bool,
}

impl Handlers {
    fn referenced(&self) -> impl Iterator<Item = &str> {
        self.language
            .iter()
            .map(|l| l.handler.as_str())
            .chain(self.received.iter().map(|(_, h)| h.as_str()))
            .chain(self.crons.iter().map(|(_, h)| h.as_str()))
            .chain(self.hooks.iter().map(|(_, h)| h.as_str()))
    }
}

/// The `ds` object visible while a script's top level runs.
#[derive(Debug, Clone, Default)]
struct Registrations(Rc<RefCell<Handlers>>);

type RegistrationResult = Result<(), Box<EvalAltResult>>;

impl Registrations {
    fn language(&mut self, prose: &str, handler: Dynamic) -> RegistrationResult {
        self.language_when(prose, handler, "always")
    }

    fn language_when(&mut self, prose: &str, handler: Dynamic, condition: &str) -> RegistrationResult {
        let prose: Prose = prose.parse().map_err(|e| format!("{e}"))?;
        let condition: Condition = condition
            .parse()
            .map_err(|_| format!("unknown condition `{condition}`"))?;
        let handler = handler_name(handler)?;
        self.0.borrow_mut().language.push(LanguageHandler {
            prose,
            handler,
            condition,
        });
        Ok(())
    }

    fn received(&mut self, event: &str, handler: Dynamic) -> RegistrationResult {
        let handler = handler_name(handler)?;
        self.0
            .borrow_mut()
            .received
            .push((event.to_string(), handler));
        Ok(())
    }

    fn cron(&mut self, spec: &str, handler: Dynamic) -> RegistrationResult {
        parse_schedule(spec).map_err(|e| format!("bad cron spec `{spec}`: {e}"))?;
        let handler = handler_name(handler)?;
        self.0.borrow_mut().crons.push((spec.to_string(), handler));
        Ok(())
    }

    fn hook(&mut self, name: &str, handler: Dynamic) -> RegistrationResult {
        let handler = handler_name(handler)?;
        self.0.borrow_mut().hooks.push((name.to_string(), handler));
        Ok(())
    }

    fn replace_grammar(&mut self) {
        self.0.borrow_mut().replace_grammar = true;
    }
}

/// Handlers are named by string or by `Fn("name")`. Closures that capture would lose their
/// captures between compile and call, so they are refused.
fn handler_name(handler: Dynamic) -> Result<String, Box<EvalAltResult>> {
    if handler.is_string() {
        return handler
            .into_string()
            .map_err(|t| format!("handler name must be a string, not {t}").into());
    }
    match handler.try_cast::<FnPtr>() {
        Some(ptr) if ptr.curry().is_empty() => Ok(ptr.fn_name().to_string()),
        Some(ptr) => Err(format!("closure {} captures variables", ptr.fn_name()).into()),
        None => Err("handler must be a function name or Fn pointer".into()),
    }
}

fn success(message: &str) -> Map {
    let mut map = Map::new();
    map.insert("success".into(), message.into());
    map
}

fn failure(message: &str) -> Map {
    let mut map = Map::new();
    map.insert("failure".into(), message.into());
    map
}

/// A script, compiled and with its registrations collected.
#[derive(Debug)]
pub struct CompiledBehavior {
    pub key: EntityKey,
    pub handlers: Handlers,
    ast: AST,
}

/// Compiles behavior source and keeps the result, keyed by entity and a hash of the source so
/// edited scripts recompile and unchanged ones never do.
pub struct Compiler {
    engine: Engine,
    cache: RefCell<HashMap<(EntityKey, [u8; 32]), Rc<CompiledBehavior>>>,
}

impl Compiler {
    pub fn new(config: &BehaviorConfig) -> Self {
        let mut engine = Engine::new();
        if config.max_operations > 0 {
            engine.set_max_operations(config.max_operations);
        }
        engine.on_print(|s| debug!(target: "dimsum::dynamic", "print: {s}"));
        engine.on_debug(|s, _, pos| debug!(target: "dimsum::dynamic", "debug {pos}: {s}"));

        host::register(&mut engine);
        engine
            .register_type_with_name::<Registrations>("Dimsum")
            .register_fn("language", Registrations::language)
            .register_fn("language", Registrations::language_when)
            .register_fn("received", Registrations::received)
            .register_fn("cron", Registrations::cron)
            .register_fn("hook", Registrations::hook)
            .register_fn("replace_grammar", Registrations::replace_grammar)
            .register_fn("success", success)
            .register_fn("failure", failure);

        Self {
            engine,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn compile(
        &self,
        key: &EntityKey,
        source: &str,
    ) -> Result<Rc<CompiledBehavior>, DynamicError> {
        let digest: [u8; 32] = Sha256::digest(source.as_bytes()).into();
        let cache_key = (key.clone(), digest);
        if let Some(compiled) = self.cache.borrow().get(&cache_key) {
            return Ok(compiled.clone());
        }

        let fault = |message: String| DynamicError::Compile {
            key: key.clone(),
            message,
        };

        let ast = self.engine.compile(source).map_err(|e| fault(e.to_string()))?;

        let registrations = Registrations::default();
        let mut scope = Scope::new();
        scope.push("ds", registrations.clone());
        self.engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|e| fault(e.to_string()))?;
        let handlers = registrations.0.take();

        let defined: HashSet<&str> = ast.iter_functions().map(|f| f.name).collect();
        if let Some(missing) = handlers.referenced().find(|h| !defined.contains(h)) {
            return Err(fault(format!("no function named `{missing}`")));
        }

        info!(
            key = %key,
            language = handlers.language.len(),
            received = handlers.received.len(),
            crons = handlers.crons.len(),
            hooks = handlers.hooks.len(),
            "compiled behavior"
        );
        let compiled = Rc::new(CompiledBehavior {
            key: key.clone(),
            handlers,
            ast,
        });
        self.cache.borrow_mut().insert(cache_key, compiled.clone());
        Ok(compiled)
    }

    /// Invoke one script function. Top level statements are not re-run.
    pub fn call(
        &self,
        compiled: &CompiledBehavior,
        name: &str,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        let mut scope = Scope::new();
        let options = CallFnOptions::new().eval_ast(false);
        self.engine
            .call_fn_with_options::<Dynamic>(options, &mut scope, &compiled.ast, name, args)
    }

    pub fn cached(&self) -> usize {
        self.cache.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compiler() -> Compiler {
        Compiler::new(&BehaviorConfig::default())
    }

    const SOURCE: &str = r#"
        fn poke(ctx, args) { "poked " + args.item }
        fn landed(ctx, ev) { ctx.log("landed"); }
        fn tick(ctx) { }

        ds.language("poke {item}", "poke", "held");
        ds.received("dropped", Fn("landed"));
        ds.cron("*/5 * * * *", "tick");
    "#;

    #[test]
    fn test_registrations_collected() {
        let compiled = compiler().compile(&"a".into(), SOURCE).unwrap();
        let handlers = &compiled.handlers;
        assert_eq!(handlers.language.len(), 1);
        assert_eq!(handlers.language[0].condition, Condition::Held);
        assert_eq!(handlers.language[0].prose.to_string(), "poke {item}");
        assert_eq!(
            handlers.received,
            vec![("dropped".to_string(), "landed".to_string())]
        );
        assert_eq!(
            handlers.crons,
            vec![("*/5 * * * *".to_string(), "tick".to_string())]
        );
        assert!(!handlers.replace_grammar);
    }

    #[test]
    fn test_cache_by_key_and_source() {
        let compiler = compiler();
        let a = compiler.compile(&"a".into(), SOURCE).unwrap();
        let again = compiler.compile(&"a".into(), SOURCE).unwrap();
        assert!(Rc::ptr_eq(&a, &again));
        compiler.compile(&"b".into(), SOURCE).unwrap();
        compiler
            .compile(&"a".into(), &format!("{SOURCE}\n// edited"))
            .unwrap();
        assert_eq!(compiler.cached(), 3);
    }

    #[test]
    fn test_call_does_not_rerun_top_level() {
        let compiler = compiler();
        let compiled = compiler.compile(&"a".into(), SOURCE).unwrap();
        let mut args = Map::new();
        args.insert("item".into(), "ball".into());
        let result = compiler
            .call(&compiled, "poke", vec![Dynamic::UNIT, Dynamic::from_map(args)])
            .unwrap();
        assert_eq!(result.into_string().unwrap(), "poked ball");
    }

    #[test]
    fn test_compile_faults() {
        let compiler = compiler();
        for source in [
            "fn broken( {",
            r#"ds.language("poke", "nowhere");"#,
            r#"fn t(ctx) {} ds.cron("every tuesday", "t");"#,
            r#"fn t(ctx) {} ds.language("poke", "t", "sometimes");"#,
            r#"throw "nope";"#,
        ] {
            let result = compiler.compile(&"a".into(), source);
            assert!(
                matches!(result, Err(DynamicError::Compile { .. })),
                "{source} should fail"
            );
        }
        assert_eq!(compiler.cached(), 0);
    }
}
