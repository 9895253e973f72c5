/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2023-2025 ByteDance and/or its affiliates.
 */

use std::fmt::{Arguments, Write};

use itoa::Integer;
use ryu::Float;
use slog::{KV, OwnedKVList, Record, Serializer};

use super::StdLogValue;
use crate::async_log::AsyncLogFormatter;

macro_rules! emit_by_itoa {
    ($($t:ty => $f:ident),* $(,)?) => {
        $(
            fn $f(&mut self, key: slog::Key, value: $t) -> slog::Result {
                self.emit_integer(key, value)
            }
        )*
    };
}

pub struct StdLogFormatter {
    append_code_position: bool,
}

impl StdLogFormatter {
    pub(super) fn new(append_code_position: bool) -> Self {
        StdLogFormatter {
            append_code_position,
        }
    }
}

impl AsyncLogFormatter<StdLogValue> for StdLogFormatter {
    fn format_slog(
        &self,
        record: &Record,
        logger_values: &OwnedKVList,
    ) -> Result<StdLogValue, slog::Error> {
        let mut kv_pairs = Vec::new();
        let mut kv_formatter = FormatterKv(&mut kv_pairs);

        record.kv().serialize(record, &mut kv_formatter)?;
        logger_values.serialize(record, &mut kv_formatter)?;

        let location = if self.append_code_position {
            let file = record
                .file()
                .rsplit_once('/')
                .map(|x| x.1)
                .unwrap_or(record.file());
            Some(format!("{}({file}:{})", record.module(), record.line()))
        } else {
            None
        };

        Ok(StdLogValue {
            level: record.level(),
            message: record.msg().to_string(),
            kv_pairs,
            location,
        })
    }
}

struct FormatterKv<'a>(&'a mut Vec<(String, String)>);

impl FormatterKv<'_> {
    fn emit_integer<T: Integer>(&mut self, key: slog::Key, value: T) -> slog::Result {
        let mut buffer = itoa::Buffer::new();
        let s = buffer.format(value);
        self.emit_str(key, s)
    }

    fn emit_float<T: Float>(&mut self, key: slog::Key, value: T) -> slog::Result {
        let mut buffer = ryu::Buffer::new();
        let s = buffer.format(value);
        self.emit_str(key, s)
    }
}

impl Serializer for FormatterKv<'_> {
    emit_by_itoa! {
        usize => emit_usize,
        isize => emit_isize,
        u8 => emit_u8,
        i8 => emit_i8,
        u16 => emit_u16,
        i16 => emit_i16,
        u32 => emit_u32,
        i32 => emit_i32,
        u64 => emit_u64,
        i64 => emit_i64,
    }

    fn emit_f32(&mut self, key: slog::Key, value: f32) -> slog::Result {
        self.emit_float(key, value)
    }

    fn emit_f64(&mut self, key: slog::Key, value: f64) -> slog::Result {
        self.emit_float(key, value)
    }

    fn emit_bool(&mut self, key: slog::Key, value: bool) -> slog::Result {
        self.emit_str(key, if value { "true" } else { "false" })
    }

    fn emit_char(&mut self, key: slog::Key, value: char) -> slog::Result {
        self.emit_str(key, value.encode_utf8(&mut [0u8; 4]))
    }

    fn emit_none(&mut self, _key: slog::Key) -> slog::Result {
        Ok(())
    }

    fn emit_str(&mut self, key: slog::Key, value: &str) -> slog::Result {
        self.0.push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn emit_arguments(&mut self, key: slog::Key, value: &Arguments) -> slog::Result {
        if let Some(s) = value.as_str() {
            return self.emit_str(key, s);
        }
        let mut s = String::with_capacity(32);
        s.write_fmt(*value)?;
        self.0.push((key.to_string(), s));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers() {
        let mut vars = Vec::new();
        let mut kv = FormatterKv(&mut vars);
        kv.emit_u16("rsp_status".into(), 404).unwrap();
        kv.emit_i64("offset".into(), -3).unwrap();
        assert_eq!(
            vars,
            [
                ("rsp_status".to_string(), "404".to_string()),
                ("offset".to_string(), "-3".to_string())
            ]
        );
    }

    #[test]
    fn none_is_skipped() {
        let mut vars = Vec::new();
        let mut kv = FormatterKv(&mut vars);
        kv.emit_none("reason".into()).unwrap();
        kv.emit_bool("keep_alive".into(), true).unwrap();
        assert_eq!(vars, [("keep_alive".to_string(), "true".to_string())]);
    }

    #[test]
    fn arguments() {
        let mut vars = Vec::new();
        let mut kv = FormatterKv(&mut vars);
        let n = 3;
        kv.emit_arguments("total_time".into(), &format_args!("{n}ms")).unwrap();
        kv.emit_f64("ratio".into(), 0.5).unwrap();
        assert_eq!(
            vars,
            [
                ("total_time".to_string(), "3ms".to_string()),
                ("ratio".to_string(), "0.5".to_string())
            ]
        );
    }
}
