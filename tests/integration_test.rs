// Integration tests for the text contract
//
// These tests drive the public entry points the way an embedding caller
// would: expression text and JSON text in, JSON text or an error out.

use jsonata_eval::{compile, evaluate, evaluate_bytes, ErrorKind, JsonFormat, UNDEFINED};

const ACCOUNT: &str = r#"{
    "Account": {
        "Name": "Firefly",
        "Order": [
            {
                "OrderID": "o1",
                "Product": [
                    {"Name": "Bowler Hat", "Price": 34.45, "Quantity": 2},
                    {"Name": "Trilby hat", "Price": 21.67, "Quantity": 1}
                ]
            },
            {
                "OrderID": "o2",
                "Product": [
                    {"Name": "Bowler Hat", "Price": 34.45, "Quantity": 4},
                    {"Name": "Cloak", "Price": 107.99, "Quantity": 1}
                ]
            }
        ]
    }
}"#;

fn eval(expr: &str, input: &str) -> String {
    evaluate(expr, input).unwrap_or_else(|e| panic!("{} failed: {}", expr, e))
}

#[test]
fn test_identity_preserves_key_order() {
    let input = r#"{"z": 1, "a": [true, null, "x"], "m": {"b": 2, "a": 1}}"#;
    assert_eq!(
        eval("$", input),
        r#"{"z":1,"a":[true,null,"x"],"m":{"b":2,"a":1}}"#
    );
}

#[test]
fn test_empty_input_is_undefined() {
    assert_eq!(eval("$", ""), UNDEFINED);
    assert_eq!(eval("name", ""), UNDEFINED);
    assert_eq!(eval("\"constant\"", ""), "\"constant\"");
}

#[test]
fn test_malformed_json_fails() {
    for input in ["{", "[1, 2", "{\"a\": }", "nul", "{'a': 1}", "[1,]"] {
        let err = evaluate("$", input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidJson, "{:?}", input);
        let err = evaluate("(", input).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidJson | ErrorKind::Expression));
    }
    let err = evaluate_bytes(b"$", b"\"\xc3\x28\"").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgs);
}

#[test]
fn test_malformed_expression_fails() {
    for expr in ["(", "[1, 2", "a.", "{\"a\": 1", "1 +", "a ? ", "\"open", "`name", "/* x", "$f(1,"] {
        for input in ["", "{}", "[1, 2]"] {
            let err = evaluate(expr, input).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Expression, "{:?}", expr);
            assert!(err.code().starts_with('S'), "{:?} gave {}", expr, err.code());
        }
    }
}

#[test]
fn test_path_navigation() {
    assert_eq!(eval("a.b.c", r#"{"a": {"b": {"c": 5}}}"#), "5");
    assert_eq!(eval("a.b.c", r#"{"a": {"b": {}}}"#), UNDEFINED);
    assert_eq!(
        eval("Account.Order.Product.Name", ACCOUNT),
        r#"["Bowler Hat","Trilby hat","Bowler Hat","Cloak"]"#
    );
    assert_eq!(eval("Account.Order.OrderID", ACCOUNT), r#"["o1","o2"]"#);
}

#[test]
fn test_predicates_are_one_based() {
    assert_eq!(eval("$[1]", "[10, 20, 30]"), "10");
    assert_eq!(eval("$[-1]", "[10, 20, 30]"), "30");
    assert_eq!(eval("Account.Order[1].OrderID", ACCOUNT), "\"o1\"");
    assert_eq!(eval("Account.Order[-1].Product[1].Name", ACCOUNT), "\"Bowler Hat\"");
    assert_eq!(eval("$count(Account.Order.Product[Price > 30])", ACCOUNT), "3");
}

#[test]
fn test_sort_is_stable() {
    let input = r#"[{"k": 1, "i": 1}, {"k": 0, "i": 0}, {"k": 1, "i": 2}]"#;
    assert_eq!(eval("$^(k).i", input), "[0,1,2]");
    assert_eq!(eval("$^(>k).i", input), "[1,2,0]");
    assert_eq!(
        eval("Account.Order.Product^(>Price).Name", ACCOUNT),
        r#"["Cloak","Bowler Hat","Bowler Hat","Trilby hat"]"#
    );
}

#[test]
fn test_duplicate_keys_overwrite() {
    assert_eq!(eval(r#"{"x": 1, "y": 0, "x": 2}"#, ""), r#"{"x":2,"y":0}"#);
    assert_eq!(
        eval("Account.Order.Product{Name: $sum(Quantity)}", ACCOUNT),
        r#"{"Bowler Hat":6,"Trilby hat":1,"Cloak":1}"#
    );
}

#[test]
fn test_aggregation() {
    assert_eq!(
        eval("$round($sum(Account.Order.Product.(Price * Quantity)), 2)", ACCOUNT),
        "336.36"
    );
    assert_eq!(
        eval("$distinct(Account.Order.Product.Name)", ACCOUNT),
        r#"["Bowler Hat","Trilby hat","Cloak"]"#
    );
    assert_eq!(eval("$max(Account.Order.Product.Quantity)", ACCOUNT), "4");
}

#[test]
fn test_transform_copies() {
    let expr = r#"(
        $t := Account ~> |Order.Product|{"Total": Price * Quantity}, ["Price"]|;
        [$t.Order.Product.Total, Account.Order.Product.Price, $keys($t.Order[1].Product[1])]
    )"#;
    assert_eq!(
        eval(expr, ACCOUNT),
        r#"[68.9,21.67,137.8,107.99,34.45,21.67,34.45,107.99,"Name","Quantity","Total"]"#
    );
}

#[test]
fn test_functions_and_closures() {
    let expr = r#"(
        $discount := function($rate) { function($p) { $p * (1 - $rate) } };
        $half := $discount(0.5);
        Account.Order.Product[Name = "Cloak"].Price ~> $half()
    )"#;
    assert_eq!(eval(expr, ACCOUNT), "53.995");
    assert_eq!(
        eval("$map([1, 2, 3], function($v, $i) { $v * $i })", ""),
        "[0,2,6]"
    );
    assert_eq!(
        eval("$reduce([1, 2, 3, 4], function($a, $b) { $a + $b })", ""),
        "10"
    );
}

#[test]
fn test_string_functions() {
    assert_eq!(eval("$uppercase(Account.Name)", ACCOUNT), "\"FIREFLY\"");
    assert_eq!(eval("$substring(\"hello world\", 6)", ""), "\"world\"");
    assert_eq!(eval("$join($split(\"a,b,c\", \",\"), \"-\")", ""), "\"a-b-c\"");
    assert_eq!(eval("$replace(\"abc\", /b/, \"X\")", ""), "\"aXc\"");
    assert_eq!(eval("$string({\"a\": [1, 2]})", ""), r#""{\"a\":[1,2]}""#);
}

#[test]
fn test_evaluation_errors_carry_codes() {
    let cases = [
        ("1 + \"a\"", "T2002"),
        ("$sum(\"a\")", "T0412"),
        ("$nothing()", "T1006"),
        ("$substring()", "T0410"),
        ("$error(\"boom\")", "D3137"),
        ("10 / 0", "D1001"),
    ];
    for (expr, code) in cases {
        let err = evaluate(expr, "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expression);
        assert_eq!(err.code(), code, "{}", expr);
    }
}

#[test]
fn test_deep_recursion_is_bounded() {
    // A plain spawned thread gets the default stack size
    let worker = std::thread::spawn(|| {
        let err = evaluate("($f := function($n) { $f($n + 1) }; $f(0))", "").unwrap_err();
        assert_eq!(err.code(), "U1001");

        let nested = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        assert_eq!(evaluate(&nested, "").unwrap_err().code(), "U1001");

        let nested = format!("{}1{}", "(".repeat(150), ")".repeat(150));
        assert_eq!(evaluate(&nested, "").unwrap(), "1");
    });
    worker.join().unwrap();
}

#[test]
fn test_deeply_nested_input() {
    let worker = std::thread::spawn(|| {
        let input = format!("{}{}", "[".repeat(200), "]".repeat(200));
        assert_eq!(eval("$", &input), input);
        assert_eq!(eval("$count($)", &input), "1");

        let input = format!("{}1{}", "{\"a\":".repeat(300), "}".repeat(300));
        let path = vec!["a"; 300].join(".");
        assert_eq!(eval(&path, &input), "1");
    });
    worker.join().unwrap();
}

#[test]
fn test_range_in_any_position() {
    assert_eq!(eval("(1..3)", ""), "[1,2,3]");
    assert_eq!(eval("$sum(1..3)", ""), "6");
    assert_eq!(
        eval("Account.Order.Product[1..2].Name", ACCOUNT),
        r#"["Bowler Hat","Trilby hat","Bowler Hat","Cloak"]"#
    );
    assert_eq!(eval("$count([1..3, 5..6])", ""), "5");
}

#[test]
fn test_compiled_expression_across_threads() {
    let expr = compile("$sum(values)").unwrap();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (1..=4)
            .map(|n| {
                let expr = &expr;
                scope.spawn(move || {
                    let input = format!("{{\"values\": [{}, {}]}}", n, n);
                    expr.evaluate(&input).unwrap()
                })
            })
            .collect();
        let results: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results, vec!["2", "4", "6", "8"]);
    });
}

#[test]
fn test_pretty_output() {
    let expr = compile("Account.Order[1].Product[1]").unwrap();
    let out = expr.evaluate_json(ACCOUNT, JsonFormat::PRETTY).unwrap();
    assert_eq!(
        out,
        "{\n  \"Name\": \"Bowler Hat\",\n  \"Price\": 34.45,\n  \"Quantity\": 2\n}"
    );
}
