//! Maps a parsed RESP argument vector to calls against the command API
//! (C5), translating [`EngineError`] into RESP error replies per the
//! disposition table in §7: `InvalidArgs`/`DatatypeMismatch`/`NotFound` are
//! surfaced to the client, `Persistence` is fatal and the caller should
//! abort the process rather than keep serving from a store that may be
//! missing durable writes.

use kvstore_engine::{Commands, EngineError, EngineResult, ExpireSpec, SetOptions};

use crate::resp::RespValue;

/// The outcome of dispatching one command: either a reply to send back, or
/// a fatal persistence failure the caller must abort the process on.
pub enum DispatchOutcome {
    Reply(RespValue),
    Fatal(EngineError),
}

fn ok_or_fatal<T>(result: EngineResult<T>, on_ok: impl FnOnce(T) -> RespValue) -> DispatchOutcome {
    match result {
        Ok(v) => DispatchOutcome::Reply(on_ok(v)),
        Err(e) if e.is_fatal() => DispatchOutcome::Fatal(e),
        Err(e) => DispatchOutcome::Reply(error_reply(&e)),
    }
}

fn error_reply(e: &EngineError) -> RespValue {
    let message = match e {
        EngineError::InvalidArgs(msg) => format!("ERR {msg}"),
        EngineError::DatatypeMismatch { expected, actual } => {
            format!("WRONGTYPE key holds {actual}, command requires {expected}")
        }
        EngineError::NotFound(key) => format!("ERR no such key: {key}"),
        EngineError::Apply(msg) => format!("ERR {msg}"),
        EngineError::Persistence(_) => unreachable!("fatal errors are handled before reaching error_reply"),
    };
    RespValue::Error(message)
}

fn wrong_arity(command: &str) -> DispatchOutcome {
    DispatchOutcome::Reply(RespValue::Error(format!("ERR wrong number of arguments for '{command}' command")))
}

fn utf8_arg(bytes: &[u8], command: &str) -> Result<String, DispatchOutcome> {
    std::str::from_utf8(bytes)
        .map(ToString::to_string)
        .map_err(|_| DispatchOutcome::Reply(RespValue::Error(format!("ERR invalid UTF-8 argument to '{command}'"))))
}

fn parse_i64(bytes: &[u8], command: &str) -> Result<i64, DispatchOutcome> {
    utf8_arg(bytes, command)?
        .parse()
        .map_err(|_| DispatchOutcome::Reply(RespValue::Error(format!("ERR value is not an integer or out of range ({command})"))))
}

fn parse_f64(bytes: &[u8], command: &str) -> Result<f64, DispatchOutcome> {
    utf8_arg(bytes, command)?
        .parse()
        .map_err(|_| DispatchOutcome::Reply(RespValue::Error(format!("ERR value is not a valid float ({command})"))))
}

/// Dispatches one already-parsed command. `argv[0]` is the command name
/// (case-insensitive); the rest are its arguments.
pub fn dispatch(commands: &Commands, argv: &[Vec<u8>]) -> DispatchOutcome {
    if argv.is_empty() {
        return DispatchOutcome::Reply(RespValue::Error("ERR empty command".to_string()));
    }
    let name = String::from_utf8_lossy(&argv[0]).to_ascii_uppercase();
    let args = &argv[1..];

    macro_rules! need {
        ($n:expr) => {
            if args.len() != $n {
                return wrong_arity(&name);
            }
        };
    }
    macro_rules! need_at_least {
        ($n:expr) => {
            if args.len() < $n {
                return wrong_arity(&name);
            }
        };
    }
    macro_rules! try_or_return {
        ($e:expr) => {
            match $e {
                Ok(v) => v,
                Err(outcome) => return outcome,
            }
        };
    }

    match name.as_str() {
        "PING" => DispatchOutcome::Reply(RespValue::Simple("PONG".to_string())),

        "SET" => {
            need_at_least!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let value = args[1].clone();
            let opts = try_or_return!(parse_set_options(&args[2..], &name));
            ok_or_fatal(commands.set(&key, value, opts), |applied| {
                if applied {
                    RespValue::ok()
                } else {
                    RespValue::NullBulk
                }
            })
        }
        "GET" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.get(&key), RespValue::from_optional_bytes)
        }
        "GETDEL" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.getdel(&key), RespValue::from_optional_bytes)
        }
        "DEL" => {
            need_at_least!(1);
            let keys = try_or_return!(decode_keys(args, &name));
            ok_or_fatal(commands.del(&keys), |n| RespValue::Integer(n as i64))
        }
        "EXISTS" => {
            need_at_least!(1);
            let keys = try_or_return!(decode_keys(args, &name));
            DispatchOutcome::Reply(RespValue::Integer(commands.exists(&keys) as i64))
        }
        "EXPIRE" => {
            need!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let seconds = try_or_return!(parse_i64(&args[1], &name));
            ok_or_fatal(commands.expire(&key, ExpireSpec::Seconds(seconds)), |b| RespValue::Integer(b as i64))
        }
        "PEXPIRE" => {
            need!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let millis = try_or_return!(parse_i64(&args[1], &name));
            ok_or_fatal(commands.expire(&key, ExpireSpec::Millis(millis)), |b| RespValue::Integer(b as i64))
        }
        "EXPIREAT" => {
            need!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let ts = try_or_return!(parse_i64(&args[1], &name));
            ok_or_fatal(commands.expire(&key, ExpireSpec::UnixSeconds(ts)), |b| RespValue::Integer(b as i64))
        }
        "PEXPIREAT" => {
            need!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let ts = try_or_return!(parse_i64(&args[1], &name));
            ok_or_fatal(commands.expire(&key, ExpireSpec::UnixMillis(ts)), |b| RespValue::Integer(b as i64))
        }
        "PERSIST" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.persist(&key), |b| RespValue::Integer(b as i64))
        }
        "TTL" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            DispatchOutcome::Reply(RespValue::Integer(commands.ttl(&key)))
        }
        "PTTL" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            DispatchOutcome::Reply(RespValue::Integer(commands.pttl(&key)))
        }
        "RENAME" => {
            need!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let newkey = try_or_return!(utf8_arg(&args[1], &name));
            ok_or_fatal(commands.rename(&key, &newkey), |()| RespValue::ok())
        }
        "KEYS" => {
            need!(1);
            let pattern = try_or_return!(utf8_arg(&args[0], &name));
            DispatchOutcome::Reply(RespValue::from_strings(commands.keys(&pattern)))
        }
        "TYPE" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let type_name = commands.type_of(&key).unwrap_or("none");
            DispatchOutcome::Reply(RespValue::Simple(type_name.to_string()))
        }

        "INCR" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.incr(&key), RespValue::Integer)
        }
        "INCRBY" => {
            need!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let delta = try_or_return!(parse_i64(&args[1], &name));
            ok_or_fatal(commands.incr_by(&key, delta), RespValue::Integer)
        }
        "DECR" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.decr(&key), RespValue::Integer)
        }
        "DECRBY" => {
            need!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let delta = try_or_return!(parse_i64(&args[1], &name));
            ok_or_fatal(commands.decr_by(&key, delta), RespValue::Integer)
        }
        "INCRBYFLOAT" => {
            need!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let delta = try_or_return!(parse_f64(&args[1], &name));
            ok_or_fatal(commands.incr_by_float(&key, delta), |v| RespValue::Bulk(v.to_string().into_bytes()))
        }

        "LPUSH" => list_push(commands, &name, args, true),
        "RPUSH" => list_push(commands, &name, args, false),
        "LPOP" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.lpop(&key), RespValue::from_optional_bytes)
        }
        "RPOP" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.rpop(&key), RespValue::from_optional_bytes)
        }
        "LLEN" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.llen(&key), |n| RespValue::Integer(n as i64))
        }
        "LINDEX" => {
            need!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let index = try_or_return!(parse_i64(&args[1], &name));
            ok_or_fatal(commands.lindex(&key, index), RespValue::from_optional_bytes)
        }
        "LRANGE" => {
            need!(3);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let start = try_or_return!(parse_i64(&args[1], &name));
            let stop = try_or_return!(parse_i64(&args[2], &name));
            ok_or_fatal(commands.lrange(&key, start, stop), RespValue::from_byte_vecs)
        }
        "LSET" => {
            need!(3);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let index = try_or_return!(parse_i64(&args[1], &name));
            ok_or_fatal(commands.lset(&key, index, args[2].clone()), |()| RespValue::ok())
        }
        "LINSERT" => {
            need!(4);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let where_arg = try_or_return!(utf8_arg(&args[1], &name)).to_ascii_uppercase();
            let before = match where_arg.as_str() {
                "BEFORE" => true,
                "AFTER" => false,
                _ => return DispatchOutcome::Reply(RespValue::Error("ERR syntax error".to_string())),
            };
            ok_or_fatal(commands.linsert(&key, before, &args[2], args[3].clone()), RespValue::Integer)
        }
        "LTRIM" => {
            need!(3);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let start = try_or_return!(parse_i64(&args[1], &name));
            let stop = try_or_return!(parse_i64(&args[2], &name));
            ok_or_fatal(commands.ltrim(&key, start, stop), |()| RespValue::ok())
        }
        "LREM" => {
            need!(3);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let count = try_or_return!(parse_i64(&args[1], &name));
            ok_or_fatal(commands.lrem(&key, count, &args[2]), |n| RespValue::Integer(n as i64))
        }

        "SADD" => {
            need_at_least!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.sadd(&key, args[1..].to_vec()), |n| RespValue::Integer(n as i64))
        }
        "SREM" => {
            need_at_least!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.srem(&key, args[1..].to_vec()), |n| RespValue::Integer(n as i64))
        }
        "SMEMBERS" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.smembers(&key), RespValue::from_byte_vecs)
        }
        "SCARD" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.scard(&key), |n| RespValue::Integer(n as i64))
        }
        "SISMEMBER" => {
            need!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.sismember(&key, &args[1]), |b| RespValue::Integer(b as i64))
        }

        "HSET" => {
            need_at_least!(3);
            if args[1..].len() % 2 != 0 {
                return wrong_arity(&name);
            }
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let mut pairs = Vec::new();
            for chunk in args[1..].chunks(2) {
                let field = try_or_return!(utf8_arg(&chunk[0], &name));
                pairs.push((field, chunk[1].clone()));
            }
            ok_or_fatal(commands.hset(&key, pairs), |n| RespValue::Integer(n as i64))
        }
        "HGET" => {
            need!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let field = try_or_return!(utf8_arg(&args[1], &name));
            ok_or_fatal(commands.hget(&key, &field), RespValue::from_optional_bytes)
        }
        "HDEL" => {
            need_at_least!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let fields = try_or_return!(decode_keys(&args[1..], &name));
            ok_or_fatal(commands.hdel(&key, fields), |n| RespValue::Integer(n as i64))
        }
        "HKEYS" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.hkeys(&key), RespValue::from_strings)
        }
        "HVALS" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.hvals(&key), RespValue::from_byte_vecs)
        }
        "HGETALL" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.hgetall(&key), |pairs| {
                let mut flat = Vec::with_capacity(pairs.len() * 2);
                for (field, value) in pairs {
                    flat.push(RespValue::Bulk(field.into_bytes()));
                    flat.push(RespValue::Bulk(value));
                }
                RespValue::Array(flat)
            })
        }
        "HLEN" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.hlen(&key), |n| RespValue::Integer(n as i64))
        }
        "HEXISTS" => {
            need!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let field = try_or_return!(utf8_arg(&args[1], &name));
            ok_or_fatal(commands.hexists(&key, &field), |b| RespValue::Integer(b as i64))
        }
        "HINCRBY" => {
            need!(3);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let field = try_or_return!(utf8_arg(&args[1], &name));
            let delta = try_or_return!(parse_i64(&args[2], &name));
            ok_or_fatal(commands.hincrby(&key, &field, delta), RespValue::Integer)
        }
        "HINCRBYFLOAT" => {
            need!(3);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let field = try_or_return!(utf8_arg(&args[1], &name));
            let delta = try_or_return!(parse_f64(&args[2], &name));
            ok_or_fatal(commands.hincrbyfloat(&key, &field, delta), |v| RespValue::Bulk(v.to_string().into_bytes()))
        }

        "ZADD" => {
            need_at_least!(3);
            if args[1..].len() % 2 != 0 {
                return wrong_arity(&name);
            }
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let mut pairs = Vec::new();
            for chunk in args[1..].chunks(2) {
                let score = try_or_return!(parse_f64(&chunk[0], &name));
                let member = try_or_return!(utf8_arg(&chunk[1], &name));
                pairs.push((score, member));
            }
            ok_or_fatal(commands.zadd(&key, pairs), |n| RespValue::Integer(n as i64))
        }
        "ZREM" => {
            need_at_least!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let members = try_or_return!(decode_keys(&args[1..], &name));
            ok_or_fatal(commands.zrem(&key, members), |n| RespValue::Integer(n as i64))
        }
        "ZSCORE" => {
            need!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let member = try_or_return!(utf8_arg(&args[1], &name));
            ok_or_fatal(commands.zscore(&key, &member), |score| {
                score.map_or(RespValue::NullBulk, |s| RespValue::Bulk(s.to_string().into_bytes()))
            })
        }
        "ZCARD" => {
            need!(1);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            ok_or_fatal(commands.zcard(&key), |n| RespValue::Integer(n as i64))
        }
        "ZRANK" => {
            need!(2);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let member = try_or_return!(utf8_arg(&args[1], &name));
            ok_or_fatal(commands.zrank(&key, &member), |rank| {
                rank.map_or(RespValue::NullBulk, |r| RespValue::Integer(r as i64))
            })
        }
        "ZRANGE" => {
            need!(3);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let start = try_or_return!(parse_i64(&args[1], &name));
            let stop = try_or_return!(parse_i64(&args[2], &name));
            ok_or_fatal(commands.zrange(&key, start, stop), member_score_array)
        }
        "ZRANGEBYSCORE" => {
            need!(3);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let min = try_or_return!(parse_f64(&args[1], &name));
            let max = try_or_return!(parse_f64(&args[2], &name));
            ok_or_fatal(commands.zrangebyscore(&key, min, max), member_score_array)
        }
        "ZINCRBY" => {
            need!(3);
            let key = try_or_return!(utf8_arg(&args[0], &name));
            let delta = try_or_return!(parse_f64(&args[1], &name));
            let member = try_or_return!(utf8_arg(&args[2], &name));
            ok_or_fatal(commands.zincrby(&key, &member, delta), |v| RespValue::Bulk(v.to_string().into_bytes()))
        }

        other => DispatchOutcome::Reply(RespValue::Error(format!("ERR unknown command '{other}'"))),
    }
}

fn member_score_array(pairs: Vec<(String, f64)>) -> RespValue {
    let mut flat = Vec::with_capacity(pairs.len() * 2);
    for (member, score) in pairs {
        flat.push(RespValue::Bulk(member.into_bytes()));
        flat.push(RespValue::Bulk(score.to_string().into_bytes()));
    }
    RespValue::Array(flat)
}

fn list_push(commands: &Commands, name: &str, args: &[Vec<u8>], left: bool) -> DispatchOutcome {
    if args.len() < 2 {
        return wrong_arity(name);
    }
    let key = match utf8_arg(&args[0], name) {
        Ok(k) => k,
        Err(outcome) => return outcome,
    };
    let values = args[1..].to_vec();
    let result = if left { commands.lpush(&key, values) } else { commands.rpush(&key, values) };
    ok_or_fatal(result, |n| RespValue::Integer(n as i64))
}

fn decode_keys(args: &[Vec<u8>], command: &str) -> Result<Vec<String>, DispatchOutcome> {
    args.iter().map(|a| utf8_arg(a, command)).collect()
}

fn parse_set_options(flags: &[Vec<u8>], command: &str) -> Result<SetOptions, DispatchOutcome> {
    let mut opts = SetOptions::default();
    let mut i = 0;
    while i < flags.len() {
        let flag = utf8_arg(&flags[i], command)?.to_ascii_uppercase();
        match flag.as_str() {
            "NX" => opts.nx = true,
            "XX" => opts.xx = true,
            "KEEPTTL" => opts.keep_ttl = true,
            "EX" | "PX" | "EXAT" | "PXAT" => {
                i += 1;
                let raw = flags.get(i).ok_or_else(|| {
                    DispatchOutcome::Reply(RespValue::Error(format!("ERR syntax error near {flag}")))
                })?;
                let n = parse_i64(raw, command)?;
                opts.expire = Some(match flag.as_str() {
                    "EX" => ExpireSpec::Seconds(n),
                    "PX" => ExpireSpec::Millis(n),
                    "EXAT" => ExpireSpec::UnixSeconds(n),
                    _ => ExpireSpec::UnixMillis(n),
                });
            }
            other => return Err(DispatchOutcome::Reply(RespValue::Error(format!("ERR unknown SET option '{other}'")))),
        }
        i += 1;
    }
    Ok(opts)
}
