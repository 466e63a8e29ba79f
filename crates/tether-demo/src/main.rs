//! Walkthrough of the bridge surface: registers a hybrid object type, then
//! drives its properties, methods, callbacks, and async work from a single
//! scripting context, printing what crosses the boundary.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tether::{
    async_bridge, create_instance, with_state, CallArg, Callable, EnumDef, MethodResult,
    ParamSpec, ReturnSpec, ScriptContext, ScriptFunction, TypeDef, Value, ValueType,
};

static DEMO_ENUM: EnumDef = EnumDef {
    name: "DemoEnum",
    variants: &["first", "second", "third"],
};

struct DemoState {
    int: i64,
    variant: String,
    last_greeting: Option<String>,
}

fn fibonacci(n: i64) -> std::result::Result<i64, String> {
    if n < 0 {
        return Err(format!("fibonacci is undefined for {n}"));
    }
    let (mut a, mut b) = (0i64, 1i64);
    for _ in 0..n {
        let next = a
            .checked_add(b)
            .ok_or_else(|| format!("fibonacci({n}) overflows a 64-bit integer"))?;
        a = b;
        b = next;
    }
    Ok(a)
}

fn register_demo_object() {
    TypeDef::builder("DemoObject")
        .constructor(vec![], |_| {
            Ok(DemoState {
                int: 0,
                variant: "first".to_string(),
                last_greeting: None,
            })
        })
        .property(
            "int",
            ValueType::Int,
            |s: &DemoState| s.int,
            |s: &mut DemoState, v| s.int = v,
        )
        .property(
            "enum",
            ValueType::Enum(&DEMO_ENUM),
            |s: &DemoState| s.variant.clone(),
            |s: &mut DemoState, v: String| s.variant = v,
        )
        .readonly_property("lastGreeting", ValueType::NullableStr, |s: &DemoState| {
            s.last_greeting.clone()
        })
        .method(
            "multipleArguments",
            vec![
                ParamSpec::Typed(ValueType::Int),
                ParamSpec::Typed(ValueType::Bool),
                ParamSpec::Typed(ValueType::Str),
            ],
            ReturnSpec::Typed(ValueType::Map),
            |_s: &mut DemoState, _scope, args| {
                let mut args = args.into_iter();
                let entries = vec![
                    ("num".to_string(), args.next().unwrap().into_value()),
                    ("flag".to_string(), args.next().unwrap().into_value()),
                    ("text".to_string(), args.next().unwrap().into_value()),
                ];
                Ok(MethodResult::Value(Value::Map(entries)))
            },
        )
        .method(
            "sayHelloCallback",
            vec![ParamSpec::Callback],
            ReturnSpec::Void,
            |s: &mut DemoState, _scope, args| {
                let cb = args.into_iter().next().unwrap().into_callback();
                if let Value::Str(reply) =
                    cb.invoke(vec![Value::Str("Hello from the native side!".to_string())])?
                {
                    s.last_greeting = Some(reply);
                }
                Ok(MethodResult::void())
            },
        )
        .method(
            "getIntGetter",
            vec![],
            ReturnSpec::Typed(ValueType::Callable),
            |_s: &mut DemoState, scope, _args| {
                let cell = scope.state();
                Ok(MethodResult::Value(Value::Callable(Callable::native(
                    move |_| Ok(Value::Int(with_state(&cell, |s: &mut DemoState| s.int))),
                ))))
            },
        )
        .method(
            "createNewHybridObject",
            vec![],
            ReturnSpec::Typed(ValueType::Object),
            |_s: &mut DemoState, scope, _args| {
                let fresh = scope.create("DemoObject", &[])?;
                Ok(MethodResult::Value(Value::Object(fresh)))
            },
        )
        .method(
            "calculateFibonacciAsync",
            vec![ParamSpec::Typed(ValueType::Int)],
            ReturnSpec::Future(ValueType::Int),
            |_s: &mut DemoState, scope, args| {
                let n = match args.into_iter().next().unwrap().into_value() {
                    Value::Int(n) => n,
                    _ => unreachable!("argument already validated"),
                };
                scope.spawn_async(async move { fibonacci(n).map(Value::Int) })
            },
        )
        .method(
            "greetLater",
            vec![ParamSpec::Callback],
            ReturnSpec::Void,
            |_s: &mut DemoState, scope, args| {
                let cb = args.into_iter().next().unwrap().into_callback();
                async_bridge::spawn(async move {
                    cb.invoke_detached(vec![Value::Str("hello from a worker".to_string())]);
                });
                Ok(MethodResult::void())
            },
        )
        .register();
}

fn main() -> Result<()> {
    env_logger::init();
    register_demo_object();

    let context = ScriptContext::new();
    let obj = create_instance("DemoObject", &[], &context.handle())?;
    println!("created {} #{}", obj.type_name(), obj.raw());

    // Typed properties, including a rejected write.
    obj.set("int", Value::Int(6723))?;
    println!("int = {:?}", obj.get("int")?);
    obj.set("enum", Value::Str("second".to_string()))?;
    println!("enum = {:?}", obj.get("enum")?);
    match obj.set("enum", Value::Str("fourth".to_string())) {
        Err(err) => println!("rejected as expected: {err}"),
        Ok(()) => return Err(anyhow!("invalid enum write was accepted")),
    }

    // Multi-argument method echoing a map.
    let echoed = obj
        .invoke(
            "multipleArguments",
            vec![
                Value::Int(10).into(),
                Value::Bool(true).into(),
                Value::Str("string".to_string()).into(),
            ],
        )?
        .expect_value();
    println!("multipleArguments -> {}", echoed.to_json());

    // Synchronous callback round trip.
    let func = ScriptFunction::new(|args| match args.into_iter().next() {
        Some(Value::Str(greeting)) => {
            println!("script callback received: {greeting}");
            Value::Str("thanks!".to_string())
        }
        _ => Value::Null,
    });
    obj.invoke("sayHelloCallback", vec![CallArg::Function(func)])?;
    println!("lastGreeting = {:?}", obj.get("lastGreeting")?);

    // A native function handed back to the scripting side.
    let getter = match obj.invoke("getIntGetter", vec![])?.expect_value() {
        Value::Callable(callable) => callable,
        other => return Err(anyhow!("expected a callable, got {other:?}")),
    };
    obj.set("int", Value::Int(99))?;
    println!("getter sees {:?}", getter.call(vec![])?);

    // Factory method.
    let fresh = match obj.invoke("createNewHybridObject", vec![])?.expect_value() {
        Value::Object(handle) => handle,
        other => return Err(anyhow!("expected an object, got {other:?}")),
    };
    println!("factory produced #{} -> {}", fresh.raw(), fresh.to_json());

    // Async method resolving a promise on the scripting context.
    let started = Instant::now();
    let promise = obj
        .invoke("calculateFibonacciAsync", vec![Value::Int(70).into()])?
        .expect_future();
    let result = context
        .block_on(&promise, Duration::from_secs(5))
        .context("fibonacci(70)")?;
    println!("fibonacci(70) = {:?} in {:?}", result, started.elapsed());

    // Overflow rejects the promise instead of resolving it.
    let promise = obj
        .invoke("calculateFibonacciAsync", vec![Value::Int(200).into()])?
        .expect_future();
    match context.block_on(&promise, Duration::from_secs(5)) {
        Err(err) => println!("fibonacci(200) rejected: {err}"),
        Ok(value) => return Err(anyhow!("fibonacci(200) resolved to {value:?}")),
    }

    // Detached callback fired from a worker; pump until it lands.
    let func = ScriptFunction::new(|args| {
        if let Some(Value::Str(text)) = args.into_iter().next() {
            println!("worker says: {text}");
        }
        Value::Null
    });
    obj.invoke("greetLater", vec![CallArg::Function(func)])?;
    context.run_until(|| false, Duration::from_millis(200));

    println!("final state: {}", obj.to_json());
    Ok(())
}
