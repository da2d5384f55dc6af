//! Timestamp and duration component accessors.
//!
//! Each timestamp accessor has a UTC form and a two-argument form taking an
//! IANA zone name or fixed offset. `getHours` through `getMilliseconds`
//! also apply to durations, where they read total units.

use cel_runtime_common::Kind;

use crate::error::EvalError;
use crate::registry::{FunctionRegistry, Overload};
use crate::time::{extract_field, TimeField};
use crate::value::Value;

pub fn register(registry: &mut FunctionRegistry) {
    register_timestamp_accessor(registry, "getFullYear", "full_year", TimeField::Year);
    register_timestamp_accessor(registry, "getMonth", "month", TimeField::Month);
    register_timestamp_accessor(registry, "getDate", "date", TimeField::DayOfMonth1);
    register_timestamp_accessor(
        registry,
        "getDayOfMonth",
        "day_of_month",
        TimeField::DayOfMonth0,
    );
    register_timestamp_accessor(registry, "getDayOfWeek", "day_of_week", TimeField::DayOfWeek);
    register_timestamp_accessor(registry, "getDayOfYear", "day_of_year", TimeField::DayOfYear);
    register_timestamp_accessor(registry, "getHours", "hours", TimeField::Hours);
    register_timestamp_accessor(registry, "getMinutes", "minutes", TimeField::Minutes);
    register_timestamp_accessor(registry, "getSeconds", "seconds", TimeField::Seconds);
    register_timestamp_accessor(
        registry,
        "getMilliseconds",
        "milliseconds",
        TimeField::Milliseconds,
    );

    register_duration_accessor(registry, "getHours", "duration_to_hours", |d| d.hours());
    register_duration_accessor(registry, "getMinutes", "duration_to_minutes", |d| {
        d.minutes()
    });
    register_duration_accessor(registry, "getSeconds", "duration_to_seconds", |d| {
        d.total_seconds()
    });
    register_duration_accessor(registry, "getMilliseconds", "duration_to_milliseconds", |d| {
        d.milliseconds()
    });
}

fn register_timestamp_accessor(
    registry: &mut FunctionRegistry,
    name: &str,
    id_suffix: &str,
    field: TimeField,
) {
    let function = name.to_string();
    registry.register_overload(
        name,
        Overload::method(
            &format!("timestamp_to_{}", id_suffix),
            vec![Kind::Timestamp],
            Kind::Int,
            move |args, _| match args {
                [Value::Timestamp(ts)] => match extract_field(ts, field, None) {
                    Ok(v) => Value::Int(v),
                    Err(err) => Value::error(err),
                },
                _ => Value::error(EvalError::no_matching_overload(&function)),
            },
        ),
    );
    let function = name.to_string();
    registry.register_overload(
        name,
        Overload::method(
            &format!("timestamp_to_{}_with_tz", id_suffix),
            vec![Kind::Timestamp, Kind::String],
            Kind::Int,
            move |args, _| match args {
                [Value::Timestamp(ts), Value::String(tz)] => {
                    match extract_field(ts, field, Some(&tz.as_cow())) {
                        Ok(v) => Value::Int(v),
                        Err(err) => Value::error(err),
                    }
                }
                _ => Value::error(EvalError::no_matching_overload(&function)),
            },
        ),
    );
}

fn register_duration_accessor(
    registry: &mut FunctionRegistry,
    name: &str,
    id: &str,
    read: fn(&crate::value::Duration) -> i64,
) {
    let function = name.to_string();
    registry.register_overload(
        name,
        Overload::method(id, vec![Kind::Duration], Kind::Int, move |args, _| {
            match args {
                [Value::Duration(d)] => Value::Int(read(d)),
                _ => Value::error(EvalError::no_matching_overload(&function)),
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdlib::testing::invoke_member;

    fn registry() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        register(&mut registry);
        registry
    }

    #[test]
    fn timestamp_components() {
        let r = registry();
        // 2009-02-13T23:31:30Z, a Friday.
        let ts = Value::timestamp(1234567890, 0);
        assert_eq!(
            invoke_member(&r, "getFullYear", &[ts.clone()]),
            Value::Int(2009)
        );
        assert_eq!(invoke_member(&r, "getMonth", &[ts.clone()]), Value::Int(1));
        assert_eq!(invoke_member(&r, "getDate", &[ts.clone()]), Value::Int(13));
        assert_eq!(
            invoke_member(&r, "getDayOfMonth", &[ts.clone()]),
            Value::Int(12)
        );
        assert_eq!(
            invoke_member(&r, "getDayOfWeek", &[ts.clone()]),
            Value::Int(5)
        );
        assert_eq!(invoke_member(&r, "getHours", &[ts.clone()]), Value::Int(23));
        assert_eq!(
            invoke_member(&r, "getSeconds", &[ts.clone()]),
            Value::Int(30)
        );
    }

    #[test]
    fn timestamp_components_zoned() {
        let r = registry();
        let ts = Value::timestamp(1234567890, 0);
        assert_eq!(
            invoke_member(&r, "getHours", &[ts.clone(), Value::from("-05:00")]),
            Value::Int(18)
        );
        assert!(
            invoke_member(&r, "getHours", &[ts, Value::from("Bad/Zone")]).is_error()
        );
    }

    #[test]
    fn duration_components() {
        let r = registry();
        let d = Value::duration(3_600 + 120 + 3, 500_000_000);
        assert_eq!(invoke_member(&r, "getHours", &[d.clone()]), Value::Int(1));
        assert_eq!(invoke_member(&r, "getMinutes", &[d.clone()]), Value::Int(62));
        assert_eq!(
            invoke_member(&r, "getSeconds", &[d.clone()]),
            Value::Int(3723)
        );
        assert_eq!(
            invoke_member(&r, "getMilliseconds", &[d]),
            Value::Int(500)
        );
    }
}
