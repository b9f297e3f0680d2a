//! Template functions
//!
//! The Go text/template builtins plus the sprig and Helm functions charts
//! rely on. Functions that need the engine itself (`include`, `tpl`, `and`,
//! `or`) live in the engine; everything else is dispatched from [`call`].
//!
//! Arguments are coerced leniently: a missing value passed where a string
//! is expected is treated as an empty string.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use semver::VersionReq;
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use crate::error::{RenderError, Result};
use crate::value::{Dict, Value, format_float};

/// Call a function by name with already evaluated arguments
pub fn call(name: &str, args: Vec<Value>) -> Result<Value> {
    let name = strip_must(name);
    let f = name.as_str();

    let value = match f {
        // Go builtins
        "not" => {
            arity(f, &args, 1)?;
            Value::Bool(!args[0].is_truthy())
        }
        "eq" => {
            min_args(f, &args, 2)?;
            Value::Bool(args[1..].iter().any(|v| args[0].loose_eq(v)))
        }
        "ne" => {
            arity(f, &args, 2)?;
            Value::Bool(!args[0].loose_eq(&args[1]))
        }
        "lt" | "le" | "gt" | "ge" => {
            arity(f, &args, 2)?;
            let ordering = args[0].compare(&args[1]).ok_or_else(|| {
                RenderError::function(f, "incompatible types for comparison")
            })?;
            Value::Bool(match f {
                "lt" => ordering == Ordering::Less,
                "le" => ordering != Ordering::Greater,
                "gt" => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        "len" => {
            arity(f, &args, 1)?;
            Value::Int(match &args[0] {
                Value::String(s) => s.len() as i64,
                Value::List(items) => items.len() as i64,
                Value::Map(map) => map.borrow().len() as i64,
                other => {
                    return Err(RenderError::function(
                        f,
                        format!("len of type {}", other.type_name()),
                    ));
                }
            })
        }
        "index" => {
            min_args(f, &args, 1)?;
            let mut current = args[0].clone();
            for key in &args[1..] {
                current = index(&current, key)?;
            }
            current
        }
        "slice" => {
            min_args(f, &args, 1)?;
            let start = args.get(1).map(Value::to_int).unwrap_or(0).max(0) as usize;
            match &args[0] {
                Value::List(items) => {
                    let end = args.get(2).map(|v| v.to_int() as usize).unwrap_or(items.len());
                    Value::List(items.get(start..end.min(items.len())).unwrap_or_default().to_vec())
                }
                Value::String(s) => {
                    let end = args.get(2).map(|v| v.to_int() as usize).unwrap_or(s.len());
                    Value::String(s.get(start..end.min(s.len())).unwrap_or_default().to_string())
                }
                other => {
                    return Err(RenderError::function(
                        f,
                        format!("can't slice item of type {}", other.type_name()),
                    ));
                }
            }
        }
        "print" => Value::String(sprint(&args)),
        "println" => {
            let line: Vec<String> = args.iter().map(Value::to_str).collect();
            Value::String(format!("{}\n", line.join(" ")))
        }
        "printf" => {
            min_args(f, &args, 1)?;
            Value::String(sprintf(&text(&args[0]), &args[1..]))
        }

        // Defaults and flow
        "default" => {
            min_args(f, &args, 1)?;
            match args.get(1) {
                Some(given) if !given.is_empty() => given.clone(),
                _ => args[0].clone(),
            }
        }
        "empty" => {
            arity(f, &args, 1)?;
            Value::Bool(args[0].is_empty())
        }
        "coalesce" => args
            .iter()
            .find(|v| !v.is_empty())
            .cloned()
            .unwrap_or_default(),
        "all" => Value::Bool(args.iter().all(|v| !v.is_empty())),
        "any" => Value::Bool(args.iter().any(|v| !v.is_empty())),
        "ternary" => {
            arity(f, &args, 3)?;
            if args[2].is_truthy() {
                args[0].clone()
            } else {
                args[1].clone()
            }
        }
        "required" => {
            arity(f, &args, 2)?;
            match &args[1] {
                Value::Nil => return Err(RenderError::Fail(text(&args[0]))),
                Value::String(s) if s.is_empty() => return Err(RenderError::Fail(text(&args[0]))),
                other => other.clone(),
            }
        }
        "fail" => return Err(RenderError::Fail(args.first().map(text).unwrap_or_default())),

        // Encoding
        "toYaml" => {
            arity(f, &args, 1)?;
            let yaml = serde_yaml::to_string(&args[0].to_json())
                .map_err(|e| RenderError::function(f, e.to_string()))?;
            Value::String(yaml.trim_end_matches('\n').to_string())
        }
        "toJson" | "toRawJson" => {
            arity(f, &args, 1)?;
            Value::String(
                serde_json::to_string(&args[0].to_json())
                    .map_err(|e| RenderError::function(f, e.to_string()))?,
            )
        }
        "toPrettyJson" => {
            arity(f, &args, 1)?;
            Value::String(
                serde_json::to_string_pretty(&args[0].to_json())
                    .map_err(|e| RenderError::function(f, e.to_string()))?,
            )
        }
        "fromYaml" | "fromJson" => {
            arity(f, &args, 1)?;
            let source = text(&args[0]);
            let parsed = if f == "fromYaml" {
                serde_yaml::from_str::<serde_json::Value>(&source).map_err(|e| e.to_string())
            } else {
                serde_json::from_str::<serde_json::Value>(&source).map_err(|e| e.to_string())
            };
            match parsed {
                Ok(json @ serde_json::Value::Object(_)) => Value::from_json(&json),
                Ok(_) => Value::empty_map(),
                Err(e) => error_map(e),
            }
        }
        "fromYamlArray" | "fromJsonArray" => {
            arity(f, &args, 1)?;
            let source = text(&args[0]);
            let parsed = if f == "fromYamlArray" {
                serde_yaml::from_str::<Vec<serde_json::Value>>(&source).map_err(|e| e.to_string())
            } else {
                serde_json::from_str::<Vec<serde_json::Value>>(&source).map_err(|e| e.to_string())
            };
            match parsed {
                Ok(items) => Value::List(items.iter().map(Value::from_json).collect()),
                Err(e) => Value::List(vec![Value::String(e)]),
            }
        }
        "b64enc" => {
            arity(f, &args, 1)?;
            Value::String(STANDARD.encode(text(&args[0])))
        }
        "b64dec" => {
            arity(f, &args, 1)?;
            let decoded = STANDARD
                .decode(text(&args[0]))
                .map_err(|e| RenderError::function(f, e.to_string()))?;
            Value::String(String::from_utf8_lossy(&decoded).into_owned())
        }
        "sha256sum" => {
            arity(f, &args, 1)?;
            Value::String(hex::encode(Sha256::digest(text(&args[0]).as_bytes())))
        }
        "toString" => {
            arity(f, &args, 1)?;
            Value::String(args[0].to_str())
        }
        "toStrings" => {
            arity(f, &args, 1)?;
            Value::List(list_of(&args[0]).iter().map(|v| Value::String(v.to_str())).collect())
        }

        // Strings
        "indent" | "nindent" => {
            arity(f, &args, 2)?;
            let pad = " ".repeat(args[0].to_int().max(0) as usize);
            let indented = format!(
                "{}{}",
                pad,
                text(&args[1]).replace('\n', &format!("\n{}", pad))
            );
            Value::String(if f == "nindent" {
                format!("\n{}", indented)
            } else {
                indented
            })
        }
        "quote" => Value::String(
            args.iter()
                .filter(|v| !matches!(v, Value::Nil))
                .map(|v| go_quote(&v.to_str()))
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "squote" => Value::String(
            args.iter()
                .filter(|v| !matches!(v, Value::Nil))
                .map(|v| format!("'{}'", v.to_str()))
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "upper" => unary_str(f, &args, |s| s.to_uppercase())?,
        "lower" => unary_str(f, &args, |s| s.to_lowercase())?,
        "title" => unary_str(f, &args, title)?,
        "untitle" => unary_str(f, &args, |s| {
            s.split(' ')
                .map(|w| {
                    let mut chars = w.chars();
                    match chars.next() {
                        Some(c) => c.to_lowercase().chain(chars).collect(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        })?,
        "trim" => unary_str(f, &args, |s| s.trim().to_string())?,
        "nospace" => unary_str(f, &args, |s| s.chars().filter(|c| !c.is_whitespace()).collect())?,
        "camelcase" => unary_str(f, &args, |s| {
            s.split(['_', '-', ' '])
                .map(|w| title(&w.to_lowercase()))
                .collect()
        })?,
        "snakecase" => unary_str(f, &args, |s| separate_words(s, '_'))?,
        "kebabcase" => unary_str(f, &args, |s| separate_words(s, '-'))?,
        "trimPrefix" => {
            arity(f, &args, 2)?;
            let s = text(&args[1]);
            Value::String(s.strip_prefix(text(&args[0]).as_str()).unwrap_or(&s).to_string())
        }
        "trimSuffix" => {
            arity(f, &args, 2)?;
            let s = text(&args[1]);
            Value::String(s.strip_suffix(text(&args[0]).as_str()).unwrap_or(&s).to_string())
        }
        "trimAll" => {
            arity(f, &args, 2)?;
            let cutset: Vec<char> = text(&args[0]).chars().collect();
            Value::String(text(&args[1]).trim_matches(cutset.as_slice()).to_string())
        }
        "trunc" => {
            arity(f, &args, 2)?;
            let n = args[0].to_int();
            let chars: Vec<char> = text(&args[1]).chars().collect();
            let len = chars.len() as i64;
            let kept: String = if n < 0 && len + n > 0 {
                chars[(len + n) as usize..].iter().collect()
            } else if n >= 0 && len > n {
                chars[..n as usize].iter().collect()
            } else {
                chars.iter().collect()
            };
            Value::String(kept)
        }
        "abbrev" => {
            arity(f, &args, 2)?;
            let width = args[0].to_int().max(0) as usize;
            let s = text(&args[1]);
            if s.chars().count() <= width || width < 4 {
                Value::String(s)
            } else {
                Value::String(format!("{}...", s.chars().take(width - 3).collect::<String>()))
            }
        }
        "substr" => {
            arity(f, &args, 3)?;
            let chars: Vec<char> = text(&args[2]).chars().collect();
            let start = args[0].to_int();
            let end = args[1].to_int();
            let len = chars.len() as i64;
            let slice: String = if start < 0 {
                chars[..end.clamp(0, len) as usize].iter().collect()
            } else if end < 0 || end > len {
                chars[start.min(len) as usize..].iter().collect()
            } else {
                chars[start.min(end) as usize..end as usize].iter().collect()
            };
            Value::String(slice)
        }
        "replace" => {
            arity(f, &args, 3)?;
            Value::String(text(&args[2]).replace(&text(&args[0]), &text(&args[1])))
        }
        "contains" => {
            arity(f, &args, 2)?;
            Value::Bool(text(&args[1]).contains(&text(&args[0])))
        }
        "hasPrefix" => {
            arity(f, &args, 2)?;
            Value::Bool(text(&args[1]).starts_with(&text(&args[0])))
        }
        "hasSuffix" => {
            arity(f, &args, 2)?;
            Value::Bool(text(&args[1]).ends_with(&text(&args[0])))
        }
        "repeat" => {
            arity(f, &args, 2)?;
            Value::String(text(&args[1]).repeat(args[0].to_int().max(0) as usize))
        }
        "splitList" => {
            arity(f, &args, 2)?;
            Value::List(
                text(&args[1])
                    .split(text(&args[0]).as_str())
                    .map(Value::from)
                    .collect(),
            )
        }
        "split" => {
            arity(f, &args, 2)?;
            Value::map(
                text(&args[1])
                    .split(text(&args[0]).as_str())
                    .enumerate()
                    .map(|(i, part)| (format!("_{}", i), Value::from(part)))
                    .collect(),
            )
        }
        "join" => {
            arity(f, &args, 2)?;
            let parts: Vec<String> = list_of(&args[1])
                .iter()
                .filter(|v| !matches!(v, Value::Nil))
                .map(Value::to_str)
                .collect();
            Value::String(parts.join(&text(&args[0])))
        }
        "cat" => Value::String(
            args.iter()
                .filter(|v| !matches!(v, Value::Nil))
                .map(Value::to_str)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "base" => unary_str(f, &args, |s| {
            s.trim_end_matches('/').rsplit('/').next().unwrap_or(".").to_string()
        })?,
        "dir" => unary_str(f, &args, |s| match s.rsplit_once('/') {
            Some(("", _)) => "/".to_string(),
            Some((dir, _)) => dir.to_string(),
            None => ".".to_string(),
        })?,
        "ext" => unary_str(f, &args, |s| {
            let base = s.rsplit('/').next().unwrap_or(s);
            base.rfind('.').map(|i| base[i..].to_string()).unwrap_or_default()
        })?,

        // Regular expressions
        "regexMatch" => {
            arity(f, &args, 2)?;
            Value::Bool(regex(f, &args[0])?.is_match(&text(&args[1])))
        }
        "regexFind" => {
            arity(f, &args, 2)?;
            let s = text(&args[1]);
            Value::String(
                regex(f, &args[0])?
                    .find(&s)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            )
        }
        "regexFindAll" => {
            arity(f, &args, 3)?;
            let s = text(&args[1]);
            let limit = limit(&args[2]);
            Value::List(
                regex(f, &args[0])?
                    .find_iter(&s)
                    .take(limit)
                    .map(|m| Value::from(m.as_str()))
                    .collect(),
            )
        }
        "regexReplaceAll" => {
            arity(f, &args, 3)?;
            let s = text(&args[1]);
            Value::String(regex(f, &args[0])?.replace_all(&s, text(&args[2]).as_str()).into_owned())
        }
        "regexReplaceAllLiteral" => {
            arity(f, &args, 3)?;
            let s = text(&args[1]);
            let replacement = text(&args[2]);
            Value::String(
                regex(f, &args[0])?
                    .replace_all(&s, NoExpand(&replacement))
                    .into_owned(),
            )
        }
        "regexSplit" => {
            arity(f, &args, 3)?;
            let s = text(&args[1]);
            let limit = limit(&args[2]);
            Value::List(
                regex(f, &args[0])?
                    .splitn(&s, limit)
                    .map(Value::from)
                    .collect(),
            )
        }

        // Lists
        "list" | "tuple" => Value::List(args),
        "first" => {
            arity(f, &args, 1)?;
            list_of(&args[0]).first().cloned().unwrap_or_default()
        }
        "last" => {
            arity(f, &args, 1)?;
            list_of(&args[0]).last().cloned().unwrap_or_default()
        }
        "rest" => {
            arity(f, &args, 1)?;
            Value::List(list_of(&args[0]).into_iter().skip(1).collect())
        }
        "initial" => {
            arity(f, &args, 1)?;
            let mut items = list_of(&args[0]);
            items.pop();
            Value::List(items)
        }
        "append" | "push" => {
            arity(f, &args, 2)?;
            let mut items = list_of(&args[0]);
            items.push(args[1].clone());
            Value::List(items)
        }
        "prepend" => {
            arity(f, &args, 2)?;
            let mut items = list_of(&args[0]);
            items.insert(0, args[1].clone());
            Value::List(items)
        }
        "concat" => Value::List(args.iter().flat_map(list_of).collect()),
        "uniq" => {
            arity(f, &args, 1)?;
            let mut unique: Vec<Value> = Vec::new();
            for item in list_of(&args[0]) {
                if !unique.iter().any(|u| u.loose_eq(&item)) {
                    unique.push(item);
                }
            }
            Value::List(unique)
        }
        "has" => {
            arity(f, &args, 2)?;
            Value::Bool(list_of(&args[1]).iter().any(|v| v.loose_eq(&args[0])))
        }
        "without" => {
            min_args(f, &args, 1)?;
            let excluded = &args[1..];
            Value::List(
                list_of(&args[0])
                    .into_iter()
                    .filter(|v| !excluded.iter().any(|e| e.loose_eq(v)))
                    .collect(),
            )
        }
        "compact" => {
            arity(f, &args, 1)?;
            Value::List(list_of(&args[0]).into_iter().filter(|v| !v.is_empty()).collect())
        }
        "reverse" => {
            arity(f, &args, 1)?;
            let mut items = list_of(&args[0]);
            items.reverse();
            Value::List(items)
        }
        "sortAlpha" => {
            arity(f, &args, 1)?;
            let mut items: Vec<String> = list_of(&args[0]).iter().map(Value::to_str).collect();
            items.sort();
            Value::List(items.into_iter().map(Value::String).collect())
        }
        "until" => {
            arity(f, &args, 1)?;
            let n = args[0].to_int();
            let range: Vec<Value> = if n >= 0 {
                (0..n).map(Value::Int).collect()
            } else {
                (n + 1..=0).rev().map(Value::Int).collect()
            };
            Value::List(range)
        }
        "untilStep" => {
            arity(f, &args, 3)?;
            let (start, stop, step) = (args[0].to_int(), args[1].to_int(), args[2].to_int());
            let mut items = Vec::new();
            let mut i = start;
            while step != 0 && ((step > 0 && i < stop) || (step < 0 && i > stop)) {
                items.push(Value::Int(i));
                i += step;
            }
            Value::List(items)
        }
        "seq" => {
            let (start, step, end) = match args.as_slice() {
                [end] => (1, 1, end.to_int()),
                [start, end] => {
                    let (start, end) = (start.to_int(), end.to_int());
                    (start, if end >= start { 1 } else { -1 }, end)
                }
                [start, step, end] => (start.to_int(), step.to_int(), end.to_int()),
                _ => return Err(RenderError::function(f, "wrong number of arguments")),
            };
            let mut items = Vec::new();
            let mut i = start;
            while step != 0 && ((step > 0 && i <= end) || (step < 0 && i >= end)) {
                items.push(i.to_string());
                i += step;
            }
            Value::String(items.join(" "))
        }

        // Dictionaries
        "dict" => {
            let mut dict = Dict::new();
            for pair in args.chunks(2) {
                let value = pair.get(1).cloned().unwrap_or_else(|| Value::from(""));
                dict.insert(pair[0].to_str(), value);
            }
            Value::map(dict)
        }
        "get" => {
            arity(f, &args, 2)?;
            match &args[0] {
                Value::Map(map) => map
                    .borrow()
                    .get(&text(&args[1]))
                    .cloned()
                    .unwrap_or_else(|| Value::from("")),
                _ => Value::from(""),
            }
        }
        "set" => {
            arity(f, &args, 3)?;
            let map = dict_arg(f, &args[0])?;
            map.borrow_mut().insert(text(&args[1]), args[2].clone());
            args[0].clone()
        }
        "unset" => {
            arity(f, &args, 2)?;
            let map = dict_arg(f, &args[0])?;
            map.borrow_mut().remove(&text(&args[1]));
            args[0].clone()
        }
        "hasKey" => {
            arity(f, &args, 2)?;
            let map = dict_arg(f, &args[0])?;
            let found = map.borrow().contains_key(&text(&args[1]));
            Value::Bool(found)
        }
        "keys" => {
            let mut keys = Vec::new();
            for arg in &args {
                let map = dict_arg(f, arg)?;
                keys.extend(map.borrow().keys().cloned().map(Value::String));
            }
            Value::List(keys)
        }
        "values" => {
            arity(f, &args, 1)?;
            let map = dict_arg(f, &args[0])?;
            let values: Vec<Value> = map.borrow().values().cloned().collect();
            Value::List(values)
        }
        "pick" | "omit" => {
            min_args(f, &args, 1)?;
            let map = dict_arg(f, &args[0])?;
            let names: Vec<String> = args[1..].iter().map(text).collect();
            let picked: Dict = map
                .borrow()
                .iter()
                .filter(|(k, _)| names.contains(k) == (f == "pick"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Value::map(picked)
        }
        "merge" | "mergeOverwrite" => {
            min_args(f, &args, 1)?;
            let dst = dict_arg(f, &args[0])?;
            for src in &args[1..] {
                let src = dict_arg(f, src)?;
                merge_dicts(&dst, &src, f == "mergeOverwrite");
            }
            args[0].clone()
        }
        "pluck" => {
            min_args(f, &args, 1)?;
            let key = text(&args[0]);
            let mut found = Vec::new();
            for arg in &args[1..] {
                if let Value::Map(map) = arg
                    && let Some(v) = map.borrow().get(&key)
                {
                    found.push(v.clone());
                }
            }
            Value::List(found)
        }
        "dig" => {
            let [keys @ .., default, dict] = args.as_slice() else {
                return Err(RenderError::function(f, "wrong number of args: want at least 3"));
            };
            if keys.is_empty() {
                return Err(RenderError::function(f, "wrong number of args: want at least 3"));
            }
            let mut current = dict.clone();
            for key in keys {
                let next = match &current {
                    Value::Map(map) => map.borrow().get(&text(key)).cloned(),
                    _ => None,
                };
                match next {
                    Some(v) => current = v,
                    None => return Ok(default.clone()),
                }
            }
            current
        }
        "deepCopy" => {
            arity(f, &args, 1)?;
            args[0].deep_copy()
        }

        // Math
        "add" => Value::Int(args.iter().map(Value::to_int).sum()),
        "add1" => {
            arity(f, &args, 1)?;
            Value::Int(args[0].to_int() + 1)
        }
        "sub" => {
            arity(f, &args, 2)?;
            Value::Int(args[0].to_int() - args[1].to_int())
        }
        "mul" => Value::Int(args.iter().map(Value::to_int).product()),
        "div" | "mod" => {
            arity(f, &args, 2)?;
            let divisor = args[1].to_int();
            if divisor == 0 {
                return Err(RenderError::function(f, "integer divide by zero"));
            }
            let dividend = args[0].to_int();
            Value::Int(if f == "div" {
                dividend / divisor
            } else {
                dividend % divisor
            })
        }
        "max" => {
            min_args(f, &args, 1)?;
            Value::Int(args.iter().map(Value::to_int).max().unwrap_or_default())
        }
        "min" => {
            min_args(f, &args, 1)?;
            Value::Int(args.iter().map(Value::to_int).min().unwrap_or_default())
        }
        "floor" | "ceil" | "round" => {
            min_args(f, &args, 1)?;
            let x = args[0].to_float();
            Value::Float(match f {
                "floor" => x.floor(),
                "ceil" => x.ceil(),
                _ => {
                    let precision = args.get(1).map(Value::to_int).unwrap_or(0) as i32;
                    let factor = 10f64.powi(precision);
                    (x * factor).round() / factor
                }
            })
        }
        "int" | "int64" => {
            arity(f, &args, 1)?;
            Value::Int(args[0].to_int())
        }
        "float64" => {
            arity(f, &args, 1)?;
            Value::Float(args[0].to_float())
        }
        "atoi" => {
            arity(f, &args, 1)?;
            Value::Int(text(&args[0]).trim().parse().unwrap_or_default())
        }

        // Types
        "kindOf" => {
            arity(f, &args, 1)?;
            Value::from(args[0].kind())
        }
        "kindIs" => {
            arity(f, &args, 2)?;
            Value::Bool(text(&args[0]) == args[1].kind())
        }
        "typeOf" => {
            arity(f, &args, 1)?;
            Value::from(args[0].type_name())
        }
        "typeIs" => {
            arity(f, &args, 2)?;
            Value::Bool(text(&args[0]) == args[1].type_name())
        }

        // Versions
        "semverCompare" => {
            arity(f, &args, 2)?;
            Value::Bool(semver_compare(&text(&args[0]), &text(&args[1]))?)
        }

        // Cluster and environment access is not available in a dry run
        "lookup" => Value::empty_map(),
        "env" | "expandenv" | "getHostByName" => Value::from(""),
        "now" => Value::String(chrono::Utc::now().to_rfc3339()),

        // Random and cryptographic material: deterministic placeholders
        "randAlphaNum" | "randAlpha" | "randNumeric" | "randAscii" => {
            arity(f, &args, 1)?;
            Value::String(placeholder(args[0].to_int().max(0) as usize, f == "randNumeric"))
        }
        "uuidv4" => Value::from("00000000-0000-4000-8000-000000000000"),
        "genCA" | "genSelfSignedCert" | "genSignedCert" | "genCAWithKey" => {
            Value::map(Dict::from([
                ("Cert".to_string(), Value::from("")),
                ("Key".to_string(), Value::from("")),
            ]))
        }
        "genPrivateKey" | "htpasswd" | "derivePassword" | "encryptAES" | "decryptAES" => {
            Value::from("")
        }

        _ => return Err(RenderError::UnknownFunction(f.to_string())),
    };

    Ok(value)
}

/// Whether a function name is known to [`call`] or handled by the engine
pub fn is_defined(name: &str) -> bool {
    matches!(name, "and" | "or" | "include" | "tpl")
        || !matches!(
            call(&strip_must(name), Vec::new()),
            Err(RenderError::UnknownFunction(_))
        )
}

/// `mustToJson` behaves as `toJson` here since errors always propagate
fn strip_must(name: &str) -> String {
    match name.strip_prefix("must") {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_uppercase()) => {
            let mut chars = rest.chars();
            chars
                .next()
                .map(|c| c.to_ascii_lowercase().to_string() + chars.as_str())
                .unwrap_or_default()
        }
        _ => name.to_string(),
    }
}

fn arity(name: &str, args: &[Value], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(RenderError::function(
            name,
            format!("wrong number of args: want {} got {}", n, args.len()),
        ));
    }
    Ok(())
}

fn min_args(name: &str, args: &[Value], n: usize) -> Result<()> {
    if args.len() < n {
        return Err(RenderError::function(
            name,
            format!("wrong number of args: want at least {} got {}", n, args.len()),
        ));
    }
    Ok(())
}

/// String argument, with nil treated as empty
fn text(value: &Value) -> String {
    match value {
        Value::Nil => String::new(),
        other => other.to_str(),
    }
}

fn unary_str(name: &str, args: &[Value], f: impl Fn(&str) -> String) -> Result<Value> {
    arity(name, args, 1)?;
    Ok(Value::String(f(&text(&args[0]))))
}

fn list_of(value: &Value) -> Vec<Value> {
    match value {
        Value::List(items) => items.clone(),
        Value::Nil => Vec::new(),
        Value::ApiVersions(versions) => versions.iter().cloned().map(Value::String).collect(),
        other => vec![other.clone()],
    }
}

fn dict_arg(name: &str, value: &Value) -> Result<Rc<RefCell<Dict>>> {
    match value {
        Value::Map(map) => Ok(map.clone()),
        other => Err(RenderError::function(
            name,
            format!("expected a dict, got {}", other.type_name()),
        )),
    }
}

fn index(collection: &Value, key: &Value) -> Result<Value> {
    match collection {
        Value::Map(map) => Ok(map.borrow().get(&key.to_str()).cloned().unwrap_or_default()),
        Value::List(items) => {
            let i = key.to_int();
            if i < 0 || i as usize >= items.len() {
                return Err(RenderError::function("index", format!("index out of range: {}", i)));
            }
            Ok(items[i as usize].clone())
        }
        Value::Nil => Err(RenderError::function("index", "index of untyped nil")),
        other => Err(RenderError::function(
            "index",
            format!("can't index item of type {}", other.type_name()),
        )),
    }
}

fn regex(name: &str, pattern: &Value) -> Result<Regex> {
    Regex::new(&text(pattern)).map_err(|e| RenderError::function(name, e.to_string()))
}

fn limit(n: &Value) -> usize {
    match n.to_int() {
        n if n < 0 => usize::MAX,
        n => n as usize,
    }
}

fn error_map(message: String) -> Value {
    Value::map(Dict::from([("Error".to_string(), Value::String(message))]))
}

/// Recursive dict merge; `overwrite` lets non-empty source values win
fn merge_dicts(dst: &Rc<RefCell<Dict>>, src: &Rc<RefCell<Dict>>, overwrite: bool) {
    if Rc::ptr_eq(dst, src) {
        return;
    }
    let src = src.borrow();
    let mut dst = dst.borrow_mut();
    for (key, value) in src.iter() {
        let existing = dst.get(key).cloned();
        match (existing, value) {
            (Some(Value::Map(d)), Value::Map(s)) => merge_dicts(&d, s, overwrite),
            (Some(existing), value) => {
                if (overwrite && !value.is_empty()) || (!overwrite && existing.is_empty()) {
                    dst.insert(key.clone(), value.clone());
                }
            }
            (None, value) => {
                dst.insert(key.clone(), value.clone());
            }
        }
    }
}

fn title(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start {
            result.extend(c.to_uppercase());
        } else {
            result.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    result
}

fn separate_words(s: &str, separator: char) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let mut previous_lower = false;
    for c in s.chars() {
        if c == '_' || c == '-' || c == ' ' {
            result.push(separator);
            previous_lower = false;
        } else if c.is_uppercase() {
            if previous_lower {
                result.push(separator);
            }
            result.extend(c.to_lowercase());
            previous_lower = false;
        } else {
            result.push(c);
            previous_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    result
}

fn placeholder(len: usize, numeric: bool) -> String {
    let seed = hex::encode(Sha256::digest(len.to_string().as_bytes()));
    seed.chars()
        .map(|c| match (numeric, c.to_digit(16)) {
            (true, Some(d)) => char::from_digit(d % 10, 10).unwrap_or('0'),
            _ => c,
        })
        .cycle()
        .take(len)
        .collect()
}

/// Go's `strconv.Quote`
pub(crate) fn go_quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c.is_control() => quoted.push_str(&format!("\\x{:02x}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Go's `fmt.Sprint`: spaces between operands when neither is a string
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        let is_string = matches!(arg, Value::String(_));
        if i > 0 && !is_string && !matches!(args[i - 1], Value::String(_)) {
            out.push(' ');
        }
        out.push_str(&arg.to_str());
    }
    out
}

/// Go's `fmt.Sprintf` for the verbs templates use
pub fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut next_arg = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut left_align = false;
        let mut zero_pad = false;
        let mut plus = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left_align = true,
                '0' => zero_pad = true,
                '+' => plus = true,
                ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }

        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }
        let mut precision: Option<usize> = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(d);
                chars.next();
            }
            precision = Some(digits.parse().unwrap_or(0));
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }

        let Some(arg) = next_arg.next() else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };

        let numeric = matches!(arg, Value::Int(_) | Value::Float(_));
        let mut formatted = match verb {
            'd' => match arg {
                Value::Int(_) | Value::Float(_) | Value::Bool(_) => arg.to_int().to_string(),
                other => format!("%!d({}={})", other.type_name(), other.to_str()),
            },
            'f' | 'F' => format!("{:.*}", precision.unwrap_or(6), arg.to_float()),
            'e' => format!("{:.*e}", precision.unwrap_or(6), arg.to_float()),
            'g' => format_float(arg.to_float()),
            'q' => go_quote(&arg.to_str()),
            't' => arg.is_truthy().to_string(),
            'x' => match arg {
                Value::Int(i) => format!("{:x}", i),
                other => hex::encode(other.to_str()),
            },
            'X' => match arg {
                Value::Int(i) => format!("{:X}", i),
                other => hex::encode_upper(other.to_str()),
            },
            'o' => format!("{:o}", arg.to_int()),
            'b' => format!("{:b}", arg.to_int()),
            'c' => char::from_u32(arg.to_int() as u32)
                .map(String::from)
                .unwrap_or_default(),
            's' | 'v' => {
                let s = arg.to_str();
                match precision {
                    Some(p) if verb == 's' => s.chars().take(p).collect(),
                    _ => s,
                }
            }
            other => format!("%!{}({})", other, arg.to_str()),
        };

        if plus && numeric && !formatted.starts_with('-') {
            formatted.insert(0, '+');
        }

        let width: usize = width.parse().unwrap_or(0);
        let len = formatted.chars().count();
        if len < width {
            let fill = width - len;
            if left_align {
                formatted.push_str(&" ".repeat(fill));
            } else if zero_pad && numeric {
                let sign = formatted.starts_with(['-', '+']);
                let at = if sign { 1 } else { 0 };
                formatted.insert_str(at, &"0".repeat(fill));
            } else {
                formatted.insert_str(0, &" ".repeat(fill));
            }
        }
        out.push_str(&formatted);
    }

    out
}

static CONSTRAINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<op>>=|<=|!=|=>|=<|==|=|>|<|~>|~|\^)?\s*v?(?P<ver>[0-9xX*]+(?:\.[0-9xX*]+)?(?:\.[0-9xX*]+)?(?:-[0-9A-Za-z.\-]+)?(?:\+[0-9A-Za-z.\-]+)?)",
    )
    .expect("constraint regex is valid")
});

/// Check a version against a Masterminds-style constraint
///
/// Supports `||` alternatives, comma or space separated comparators and
/// short versions with prerelease suffixes such as `>=1.19-0`.
pub fn semver_compare(constraint: &str, version: &str) -> Result<bool> {
    let version = hubtrack_core::parse_version(version)
        .map_err(|e| RenderError::function("semverCompare", e.to_string()))?;

    for alternative in constraint.split("||") {
        let mut comparators = Vec::new();
        let mut excluded = Vec::new();

        for caps in CONSTRAINT_RE.captures_iter(alternative) {
            let op = match caps.name("op").map(|m| m.as_str()).unwrap_or("") {
                "=>" => ">=",
                "=<" => "<=",
                "==" => "=",
                "~>" => "~",
                op => op,
            };
            let ver = pad_version(&caps["ver"]);
            if op == "!=" {
                excluded.push(hubtrack_core::parse_version(&ver).map_err(|e| {
                    RenderError::function("semverCompare", e.to_string())
                })?);
            } else {
                comparators.push(format!("{}{}", op, ver));
            }
        }

        let requirement = if comparators.is_empty() {
            "*".to_string()
        } else {
            comparators.join(", ")
        };
        let req = VersionReq::parse(&requirement).map_err(|e| {
            RenderError::function(
                "semverCompare",
                format!("improper constraint: {}: {}", constraint, e),
            )
        })?;

        if req.matches(&version) && !excluded.contains(&version) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Pad `1.19-0` to `1.19.0-0`, leaving wildcards and full versions alone
fn pad_version(version: &str) -> String {
    let (core, suffix) = match version.find(['-', '+']) {
        Some(i) => version.split_at(i),
        None => (version, ""),
    };
    if suffix.is_empty() || core.contains(['x', 'X', '*']) {
        return version.to_string();
    }
    let mut parts: Vec<&str> = core.split('.').collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    format!("{}{}", parts.join("."), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_json(name: &str, args: Vec<Value>) -> serde_json::Value {
        call(name, args).unwrap().to_json()
    }

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    #[test]
    fn test_default_and_empty() {
        assert_eq!(call("default", vec![s("x"), Value::Nil]).unwrap().to_str(), "x");
        assert_eq!(call("default", vec![s("x")]).unwrap().to_str(), "x");
        assert_eq!(call("default", vec![s("x"), s("y")]).unwrap().to_str(), "y");
        assert_eq!(call("default", vec![Value::Int(1), Value::Int(0)]).unwrap().to_str(), "1");
        assert!(call("empty", vec![Value::empty_map()]).unwrap().is_truthy());
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call("quote", vec![s("a\"b")]).unwrap().to_str(), r#""a\"b""#);
        assert_eq!(call("quote", vec![Value::Nil]).unwrap().to_str(), "");
        assert_eq!(call("squote", vec![s("a")]).unwrap().to_str(), "'a'");
        assert_eq!(call("nindent", vec![Value::Int(2), s("a\nb")]).unwrap().to_str(), "\n  a\n  b");
        assert_eq!(call("trunc", vec![Value::Int(3), s("abcdef")]).unwrap().to_str(), "abc");
        assert_eq!(call("trunc", vec![Value::Int(-2), s("abcdef")]).unwrap().to_str(), "ef");
        assert_eq!(call("trimSuffix", vec![s("-"), s("name-")]).unwrap().to_str(), "name");
        assert_eq!(call("replace", vec![s("_"), s("-"), s("a_b_c")]).unwrap().to_str(), "a-b-c");
        assert_eq!(call("title", vec![s("hello world")]).unwrap().to_str(), "Hello World");
        assert_eq!(call("snakecase", vec![s("HttpServer")]).unwrap().to_str(), "http_server");
        assert_eq!(call("camelcase", vec![s("http_server")]).unwrap().to_str(), "HttpServer");
        assert_eq!(
            call("substr", vec![Value::Int(0), Value::Int(3), s("hello")])
                .unwrap()
                .to_str(),
            "hel"
        );
    }

    #[test]
    fn test_printf() {
        assert_eq!(
            sprintf("%s-%s", &[s("release"), s("app")]),
            "release-app"
        );
        assert_eq!(sprintf("%d%%", &[Value::Int(50)]), "50%");
        assert_eq!(sprintf("%.2f", &[Value::Float(1.5)]), "1.50");
        assert_eq!(sprintf("%05d", &[Value::Int(42)]), "00042");
        assert_eq!(sprintf("%-4s|", &[s("a")]), "a   |");
        assert_eq!(sprintf("%q", &[s("x")]), "\"x\"");
        assert_eq!(sprintf("%v %v", &[Value::Bool(true)]), "true %!v(MISSING)");
        assert_eq!(sprintf("%s:%v", &[s("img"), Value::Int(3)]), "img:3");
    }

    #[test]
    fn test_print() {
        assert_eq!(sprint(&[s("a"), s("b")]), "ab");
        assert_eq!(sprint(&[Value::Int(1), Value::Int(2)]), "1 2");
        assert_eq!(sprint(&[s("a"), Value::Int(2)]), "a2");
    }

    #[test]
    fn test_dict_functions() {
        let d = call("dict", vec![s("a"), Value::Int(1), s("b"), s("x")]).unwrap();
        assert_eq!(d.to_json(), json!({"a": 1, "b": "x"}));

        call("set", vec![d.clone(), s("c"), Value::Bool(true)]).unwrap();
        assert_eq!(d.to_json(), json!({"a": 1, "b": "x", "c": true}));

        assert!(call("hasKey", vec![d.clone(), s("c")]).unwrap().is_truthy());
        assert_eq!(call_json("keys", vec![d.clone()]), json!(["a", "b", "c"]));
        assert_eq!(call_json("pick", vec![d.clone(), s("a")]), json!({"a": 1}));
        assert_eq!(call_json("omit", vec![d.clone(), s("a"), s("c")]), json!({"b": "x"}));
        assert_eq!(call_json("get", vec![d.clone(), s("missing")]), json!(""));

        let nested = Value::from_json(&json!({"a": {"b": {"c": 1}}}));
        assert_eq!(
            call_json("dig", vec![s("a"), s("b"), s("c"), s("none"), nested.clone()]),
            json!(1)
        );
        assert_eq!(call_json("dig", vec![s("a"), s("x"), s("none"), nested]), json!("none"));
    }

    #[test]
    fn test_merge() {
        let dst = Value::from_json(&json!({"a": 1, "nested": {"x": 1}, "empty": ""}));
        let src = Value::from_json(&json!({"a": 2, "b": 3, "nested": {"x": 2, "y": 2}, "empty": "filled"}));
        call("merge", vec![dst.clone(), src.clone()]).unwrap();
        assert_eq!(
            dst.to_json(),
            json!({"a": 1, "b": 3, "nested": {"x": 1, "y": 2}, "empty": "filled"})
        );

        let dst = Value::from_json(&json!({"a": 1, "nested": {"x": 1}}));
        call("mergeOverwrite", vec![dst.clone(), src]).unwrap();
        assert_eq!(
            dst.to_json(),
            json!({"a": 2, "b": 3, "nested": {"x": 2, "y": 2}, "empty": "filled"})
        );
    }

    #[test]
    fn test_list_functions() {
        let list = Value::from_json(&json!(["b", "a", "b", ""]));
        assert_eq!(call_json("uniq", vec![list.clone()]), json!(["b", "a", ""]));
        assert_eq!(call_json("compact", vec![list.clone()]), json!(["b", "a", "b"]));
        assert_eq!(call_json("first", vec![list.clone()]), json!("b"));
        assert_eq!(call_json("without", vec![list.clone(), s("b")]), json!(["a", ""]));
        assert!(call("has", vec![s("a"), list]).unwrap().is_truthy());
        assert_eq!(call_json("until", vec![Value::Int(3)]), json!([0, 1, 2]));
        assert_eq!(call_json("seq", vec![Value::Int(3)]), json!("1 2 3"));
        assert_eq!(
            call_json("join", vec![s(","), Value::from_json(&json!(["a", 1]))]),
            json!("a,1")
        );
    }

    #[test]
    fn test_encoding() {
        let value = Value::from_json(&json!({"image": {"tag": "1.0"}}));
        assert_eq!(call("toYaml", vec![value.clone()]).unwrap().to_str(), "image:\n  tag: '1.0'");
        assert_eq!(call("toJson", vec![value]).unwrap().to_str(), r#"{"image":{"tag":"1.0"}}"#);
        assert_eq!(call("b64enc", vec![s("hello")]).unwrap().to_str(), "aGVsbG8=");
        assert_eq!(call("b64dec", vec![s("aGVsbG8=")]).unwrap().to_str(), "hello");
        assert_eq!(
            call_json("fromYaml", vec![s("a: 1\nb: [x]")]),
            json!({"a": 1, "b": ["x"]})
        );
        let broken = call("fromYaml", vec![s("a: [")]).unwrap();
        assert!(broken.to_json()["Error"].is_string());
    }

    #[test]
    fn test_regex() {
        assert!(call("regexMatch", vec![s("^v[0-9]+$"), s("v12")]).unwrap().is_truthy());
        assert_eq!(
            call("regexReplaceAll", vec![s("a(x*)b"), s("-ab-axxb-"), s("${1}W")]).unwrap().to_str(),
            "-W-xxW-"
        );
        assert!(call("regexMatch", vec![s("("), s("x")]).is_err());
    }

    #[test]
    fn test_math() {
        assert_eq!(call_json("add", vec![Value::Int(1), Value::Int(2), Value::Float(3.9)]), json!(6));
        assert_eq!(call_json("sub", vec![Value::Int(5), Value::Int(2)]), json!(3));
        assert!(call("div", vec![Value::Int(1), Value::Int(0)]).is_err());
        assert_eq!(call_json("max", vec![Value::Int(1), Value::Int(7), Value::Int(3)]), json!(7));
        assert_eq!(call_json("int", vec![s("42")]), json!(42));
    }

    #[test]
    fn test_comparisons() {
        assert!(call("eq", vec![s("a"), s("b"), s("a")]).unwrap().is_truthy());
        assert!(call("lt", vec![Value::Int(1), Value::Float(1.5)]).unwrap().is_truthy());
        assert!(call("ge", vec![s("b"), s("a")]).unwrap().is_truthy());
        assert!(call("lt", vec![s("a"), Value::Int(1)]).is_err());
    }

    #[test]
    fn test_semver_compare() {
        assert!(semver_compare(">=1.19-0", "v1.20.0").unwrap());
        assert!(semver_compare(">= 1.16.0-0, < 1.21.0-0", "1.20.0").unwrap());
        assert!(!semver_compare("<1.19", "1.20.0").unwrap());
        assert!(semver_compare("<1.19 || >=1.20", "1.20.0").unwrap());
        assert!(semver_compare("^1.2.0", "1.20.0").unwrap());
        assert!(!semver_compare("!=1.20.0", "1.20.0").unwrap());
        assert!(semver_compare("1.20.x", "1.20.0").unwrap());
    }

    #[test]
    fn test_must_prefix_and_unknown() {
        assert_eq!(call("mustToJson", vec![Value::Int(1)]).unwrap().to_str(), "1");
        assert!(matches!(
            call("frobnicate", vec![]),
            Err(RenderError::UnknownFunction(name)) if name == "frobnicate"
        ));
        assert!(is_defined("include"));
        assert!(is_defined("toYaml"));
        assert!(!is_defined("frobnicate"));
    }
}
