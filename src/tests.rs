#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    use crate::core::macros::{MacroHandler, MacroSignature, ParamType};
    use crate::escape::decode_all;
    use crate::{
        CALL_STACK_LIMIT_ERROR, ChatBridge, ConditionEvaluator, Engine, EngineConfig, EngineFactory,
        EvaluationContext, Invocation, MacroContext, MacroError, MacroOutput, MacroRegistry, TempVars,
    };

    #[derive(Debug, Default)]
    struct DummyBridge {
        variables: RwLock<HashMap<String, String>>,
    }

    impl ChatBridge for DummyBridge {
        fn char_name(&self) -> String {
            "Seraphina".to_string()
        }

        fn user_name(&self) -> String {
            "Yuki".to_string()
        }

        fn chat_variable(&self, name: &str) -> Option<String> {
            self.variables.read().unwrap().get(name).cloned()
        }

        fn set_chat_variable(&self, name: &str, value: String) -> Result<(), MacroError> {
            self.variables.write().unwrap().insert(name.to_string(), value);
            Ok(())
        }

        fn global_variable(&self, name: &str) -> Option<String> {
            (name == "season").then(|| "winter".to_string())
        }
    }

    /// Always reports `1`.
    struct FlagMacro;

    impl MacroHandler<DummyBridge> for FlagMacro {
        fn call(
            &self,
            _: &Invocation,
            _: &MacroContext<'_, DummyBridge>,
            _: &TempVars,
        ) -> Result<MacroOutput, MacroError> {
            Ok(MacroOutput::Text("1".to_string()))
        }

        fn signature(&self) -> MacroSignature {
            MacroSignature::new("flag", "Test flag")
        }
    }

    /// Re-evaluates its argument one level deeper.
    struct EvalMacro;

    impl MacroHandler<DummyBridge> for EvalMacro {
        fn call(
            &self,
            invocation: &Invocation,
            ctx: &MacroContext<'_, DummyBridge>,
            vars: &TempVars,
        ) -> Result<MacroOutput, MacroError> {
            let nested = ctx.evaluate_nested(&invocation.raw_args, vars.clone());
            Ok(MacroOutput::WithVars { text: nested.output, vars: nested.vars })
        }

        fn signature(&self) -> MacroSignature {
            MacroSignature::new("eval", "Evaluates its argument again")
                .alias("reeval")
                .param("text", ParamType::Text, "The text to evaluate")
                .variadic()
        }
    }

    struct FixedCondition(bool);

    impl ConditionEvaluator<DummyBridge> for FixedCondition {
        fn evaluate(&self, _: &[String], _: &DummyBridge) -> bool {
            self.0
        }
    }

    fn init() {
        let _ = env_logger::builder().is_test(true).filter_level(log::LevelFilter::Trace).try_init();
    }

    fn engine() -> Engine<DummyBridge> {
        let registry = MacroRegistry::new();
        registry.register_macro(Arc::new(FlagMacro));
        registry.register_macro(Arc::new(EvalMacro));
        Engine::new(Arc::new(registry))
    }

    fn eval(engine: &Engine<DummyBridge>, bridge: &DummyBridge, text: &str) -> String {
        engine.evaluate(text, EvaluationContext::new(bridge))
    }

    #[test]
    fn test_plain_text() {
        init();
        let bridge = DummyBridge::default();
        assert_eq!(eval(&engine(), &bridge, "plain text"), "plain text");
        assert_eq!(eval(&engine(), &bridge, ""), "");
    }

    #[test]
    fn test_unknown_macro_round_trip() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        assert_eq!(eval(&engine, &bridge, "{{totally_unknown_name}}"), "{{totally_unknown_name}}");
        assert_eq!(eval(&engine, &bridge, "{{mystery::a::b}} ok"), "{{mystery::a::b}} ok");
        assert_eq!(eval(&engine, &bridge, "{{#nope}}x{{/nope}}"), "{{#nope}}x{{/nope}}");
        assert_eq!(eval(&engine, &bridge, "{{/each}} {{:else}}"), "{{/each}} {{:else}}");
    }

    #[test]
    fn test_unbalanced_input_is_kept() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        assert_eq!(eval(&engine, &bridge, "a {{ b"), "a {{ b");
        assert_eq!(eval(&engine, &bridge, "x }} y { z"), "x }} y { z");
        assert_eq!(eval(&engine, &bridge, "{{#pure}}abc"), "{{#pure}}abc");
        assert_eq!(eval(&engine, &bridge, "{{user}} {{#when::1}}open {{ {#if"), "Yuki {{#when::1}}open {{ {#if");
        assert_eq!(eval(&engine, &bridge, "{{#pure}} {{ x {{/pure}}"), "{{#pure}} {{ x {{/pure}}");
    }

    #[test]
    fn test_conditional_with_stubbed_condition() {
        init();
        let bridge = DummyBridge::default();
        let input = "{{#when::flag}}YES{{:else}}NO{{/when}}";

        let mut truthy = engine();
        truthy.set_condition_evaluator(Arc::new(FixedCondition(true)));
        assert_eq!(eval(&truthy, &bridge, input), "YES");

        let mut falsy = engine();
        falsy.set_condition_evaluator(Arc::new(FixedCondition(false)));
        assert_eq!(eval(&falsy, &bridge, input), "NO");
    }

    #[test]
    fn test_conditional_with_default_condition() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        assert_eq!(eval(&engine, &bridge, "{{#when::{{flag}}}}YES{{:else}}NO{{/when}}"), "YES");
        assert_eq!(eval(&engine, &bridge, "{{#when::{{flag}}::is::0}}YES{{:else}}NO{{/when}}"), "NO");
        assert_eq!(eval(&engine, &bridge, "[{{#when::0}}hidden{{/when}}]"), "[]");
        assert_eq!(
            eval(&engine, &bridge, "{{#when::{{user}}::is::Yuki}}\n    line one\n    line two\n{{/when}}"),
            "line one\nline two"
        );
        assert_eq!(eval(&engine, &bridge, "{{#when::keep::1}} a {{/when}}"), " a ");
    }

    #[test]
    fn test_untaken_branch_is_not_evaluated() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();

        let output = eval(&engine, &bridge, "{{#when::0}}{{settempvar::x::1}}A{{:else}}B{{/when}}[{{tempvar::x}}]");
        assert_eq!(output, "B[]");

        let output = eval(&engine, &bridge, "{{#when::1}}A{{:else}}{{setvar::hit::1}}B{{/when}}");
        assert_eq!(output, "A");
        assert_eq!(bridge.chat_variable("hit"), None);
    }

    #[test]
    fn test_legacy_conditionals() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        assert_eq!(eval(&engine, &bridge, "{{#if 1}}  yes  {{/if}}|{{#if 0}}no{{/if}}"), "yes|");
        assert_eq!(eval(&engine, &bridge, "{{#if_pure true}}  kept  {{/if_pure}}"), "  kept  ");
        assert_eq!(eval(&engine, &bridge, "{#if 1\n  shown {{user}} #}"), "shown Yuki");
        assert_eq!(eval(&engine, &bridge, "{#if 0\nhidden#}!"), "!");
        assert_eq!(eval(&engine, &bridge, "{#note\nx#}"), "{#note\nx#}");
    }

    #[test]
    fn test_loop_expansion() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        assert_eq!(eval(&engine, &bridge, r#"{{#each::["a","b","c"]}}[{{slot}}]{{/each}}"#), "[a][b][c]");
        assert_eq!(
            eval(&engine, &bridge, "{{#each {{array::x::y}} as it}}{{upper::{{slot::it}}}} {{/each}}"),
            "X Y "
        );
        assert_eq!(eval(&engine, &bridge, "{{#each [] as it}}never{{/each}}end"), "end");
        assert_eq!(
            eval(&engine, &bridge, r#"{{#each ["was as big","x"]}}[{{slot}}]{{/each}}"#),
            "[was as big][x]"
        );
    }

    #[test]
    fn test_nested_loops() {
        init();
        let bridge = DummyBridge::default();
        let input = r#"{{#each ["a","b"] as o}}{{#each ["1","2"] as i}}{{slot::o}}{{slot::i}};{{/each}}{{/each}}"#;
        assert_eq!(eval(&engine(), &bridge, input), "a1;a2;b1;b2;");
    }

    #[test]
    fn test_function_call() {
        init();
        let bridge = DummyBridge::default();
        let input = "{{#func greet who}}\nHello, {{arg::0}}! I am {{char}}.\n{{/func}}{{call::greet::Ann}} {{call::greet::Bo}}";
        assert_eq!(eval(&engine(), &bridge, input), "Hello, Ann! I am Seraphina. Hello, Bo! I am Seraphina.");
    }

    #[test]
    fn test_undefined_function_is_kept() {
        init();
        let bridge = DummyBridge::default();
        assert_eq!(eval(&engine(), &bridge, "{{call::ghost::1}}"), "{{call::ghost::1}}");
    }

    #[test]
    fn test_recursion_cap() {
        init();
        let bridge = DummyBridge::default();
        let output = eval(&engine(), &bridge, "{{#func self}}x{{call::self}}{{/func}}{{call::self}}");
        assert_eq!(output, format!("{}{}", "x".repeat(20), CALL_STACK_LIMIT_ERROR));
    }

    #[test]
    fn test_return_short_circuit() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        assert_eq!(eval(&engine, &bridge, "before {{return::X}} after"), "X");
        assert_eq!(eval(&engine, &bridge, "before {{return}} after"), "null");

        let session = engine.evaluate_session("a{{return::b}}c", EvaluationContext::new(&bridge));
        assert!(session.returned);
        assert_eq!(session.output, "b");
    }

    #[test]
    fn test_return_inside_function_ends_the_call() {
        init();
        let bridge = DummyBridge::default();
        let input = "a{{#func f}}{{return::inner}}tail{{/func}}[{{call::f}}]b";
        assert_eq!(eval(&engine(), &bridge, input), "a[inner]b");
    }

    #[test]
    fn test_pure_region() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        assert_eq!(eval(&engine, &bridge, "{{#pure}}{{user}}{{/pure}} {{user}}"), "{{user}} Yuki");
        assert_eq!(
            eval(&engine, &bridge, "{{#pure}}{{#when::1}}{{char}}{{/when}}{{/pure}}"),
            "{{#when::1}}{{char}}{{/when}}"
        );
    }

    #[test]
    fn test_deeply_nested_ignored_blocks() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        for depth in [1, 2, 7, 64, 300] {
            let inner = format!(
                "{}{{{{user}}}}{}",
                "{{#each x}}".repeat(depth),
                "{{/each}}".repeat(depth)
            );
            let input = format!("{{{{#pure}}}}{}{{{{/pure}}}}", inner);
            assert_eq!(eval(&engine, &bridge, &input), inner, "depth {}", depth);
        }
    }

    #[test]
    fn test_display_escape_and_code_blocks() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        assert_eq!(
            eval(&engine, &bridge, "{{#puredisplay}}{{user}}{{/puredisplay}}"),
            "\\{\\{user\\}\\}"
        );

        let escaped = eval(&engine, &bridge, "{{#escape}}{{user}}: (hi){{/escape}}");
        assert!(!escaped.contains('{'));
        assert!(!escaped.contains('('));
        assert_eq!(decode_all(&escaped), "{{user}}: (hi)");

        assert_eq!(eval(&engine, &bridge, "{{#code}}\n  a\\n{{user}}\n{{/code}}"), "a\nYuki");
    }

    #[test]
    fn test_temp_vars() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        assert_eq!(eval(&engine, &bridge, "{{settempvar::mood::calm}}I am {{tempvar::mood}}"), "I am calm");

        let mut vars = TempVars::new();
        vars.insert("carried".to_string(), "over".to_string());
        let session = engine.evaluate_session(
            "{{gettempvar::carried}}{{settempvar::fresh::yes}}",
            EvaluationContext::new(&bridge).with_vars(vars),
        );
        assert_eq!(session.output, "over");
        assert_eq!(session.vars.get("fresh").map(String::as_str), Some("yes"));
    }

    #[test]
    fn test_chat_variables() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        assert_eq!(eval(&engine, &bridge, "{{setvar::hp::10}}{{addvar::hp::5}}{{getvar::hp}}"), "15");
        assert_eq!(eval(&engine, &bridge, "{{getvar::missing}}"), "null");
        assert_eq!(eval(&engine, &bridge, "{{getglobalvar::season}}"), "winter");
        assert_eq!(eval(&engine, &bridge, "{{#when::var::hp}}set{{:else}}unset{{/when}}"), "unset");
    }

    #[test]
    fn test_tokenize_accurate_is_deterministic() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        let context = || EvaluationContext::new(&bridge).tokenize_accurate(true);
        assert_eq!(engine.evaluate("{{random::a::b::c}}", context()), "a");
        assert_eq!(engine.evaluate("{{randint::3::9}}", context()), "3");
        assert_eq!(engine.evaluate("{{setvar::x::1}}done", context()), "done");
        assert_eq!(bridge.chat_variable("x"), None);
    }

    #[test]
    fn test_random_picks_an_option() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        let valid_results = vec!["sunny".to_string(), "cloudy".to_string(), "rainy".to_string()];
        for _ in 0..20 {
            let weather = eval(&engine, &bridge, "{{random::sunny::cloudy::rainy}}");
            assert!(valid_results.contains(&weather));
            let comma = eval(&engine, &bridge, "{{random::sunny,cloudy,rainy}}");
            assert!(valid_results.contains(&comma));
        }
        let roll: u64 = eval(&engine, &bridge, "{{roll::2d6}}").parse().unwrap();
        assert!((2..=12).contains(&roll));
    }

    #[test]
    fn test_failing_handlers_are_kept_literal() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        assert_eq!(eval(&engine, &bridge, "{{randint::5::1}}"), "{{randint::5::1}}");
        assert_eq!(eval(&engine, &bridge, "{{array_length::[oops}}"), "{{array_length::[oops}}");
        assert_eq!(eval(&engine, &bridge, "{{calc::1/0}}"), "{{calc::1/0}}");
        assert_eq!(eval(&engine, &bridge, "{{user::extra}}"), "{{user::extra}}");
        assert_eq!(
            eval(&engine, &bridge, "{{roll::1000d18446744073709551615}}"),
            "{{roll::1000d18446744073709551615}}"
        );
    }

    #[test]
    fn test_builtin_text_macros() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        assert_eq!(eval(&engine, &bridge, "<user> greets <CHAR> and <bot>"), "Yuki greets Seraphina and Seraphina");
        assert_eq!(eval(&engine, &bridge, "{{? 1 + 2 * 3}} {{calc::(2+3)*2}}"), "7 10");
        assert_eq!(eval(&engine, &bridge, "{{replace::a-b-c::-::+}}"), "a+b+c");
        assert_eq!(eval(&engine, &bridge, "{{bo}}user{{bc}}"), "{{user}}");
        assert_eq!(eval(&engine, &bridge, "a{{br}}b{{none}}"), "a\nb");
        assert_eq!(
            eval(&engine, &bridge, r#"{{array_element::["x","y","z"]::-1}} {{join::{{array::p::q}}::+}}"#),
            "z p+q"
        );

        let punctuation = eval(&engine, &bridge, "{{(}}x{{:}}{{)}}");
        assert!(!punctuation.contains('('));
        assert_eq!(decode_all(&punctuation), "(x:)");
    }

    #[test]
    fn test_comments() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        assert_eq!(eval(&engine, &bridge, "a{{comment::note}}{{// hidden}}b"), "ab");
        let shown = engine.evaluate("{{comment::note}}", EvaluationContext::new(&bridge).visualize(true));
        assert_eq!(shown, "<div class=\"cbs-comment\">note</div>");
    }

    #[test]
    fn test_nested_evaluation_from_handler() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        assert_eq!(eval(&engine, &bridge, "{{eval::{{bo}}user{{bc}}}}"), "Yuki");
        assert_eq!(eval(&engine, &bridge, "{{reeval::{{bo}}settempvar::k::v{{bc}}}}{{tempvar::k}}"), "v");

        let capped = engine.evaluate("{{eval::{{bo}}user{{bc}}}}", EvaluationContext::new(&bridge).at_depth(20));
        assert_eq!(capped, CALL_STACK_LIMIT_ERROR);
    }

    #[test]
    fn test_function_table_threading() {
        init();
        let bridge = DummyBridge::default();
        let engine = engine();
        let first = engine.evaluate_session("{{#func hi name}}hi {{arg::name}}{{/func}}", EvaluationContext::new(&bridge));
        assert_eq!(first.output, "");
        assert!(first.functions.contains("hi"));

        let second = engine.evaluate("{{call::hi::there}}", EvaluationContext::new(&bridge).with_functions(first.functions));
        assert_eq!(second, "hi there");
    }

    #[test]
    fn test_engine_config() {
        init();
        let bridge = DummyBridge::default();

        let mut shallow = engine();
        shallow.set_config(EngineConfig::from_json(r#"{"call_depth_limit": 3}"#).unwrap());
        let output = eval(&shallow, &bridge, "{{#func self}}x{{call::self}}{{/func}}{{call::self}}");
        assert_eq!(output, format!("xxx{}", CALL_STACK_LIMIT_ERROR));

        let mut capped = engine();
        capped.set_config(EngineConfig { input_char_limit: Some(5), ..EngineConfig::default() });
        assert_eq!(eval(&capped, &bridge, "{{user}}"), "{{user}}");

        let mut literal_angles = engine();
        literal_angles.set_config(EngineConfig { normalize_angle_macros: false, ..EngineConfig::default() });
        assert_eq!(eval(&literal_angles, &bridge, "<user>"), "<user>");

        assert!(EngineConfig::from_json("{\"call_depth_limit\": -1}").is_err());
    }
}
