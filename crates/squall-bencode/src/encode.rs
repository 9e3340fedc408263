//! Canonical Bencode encoder.
//!
//! Dictionaries are stored sorted, so the output is deterministic: encoding
//! any [`Value`] twice yields identical bytes, and
//! `encode(&decode(input)?) == input` for canonical inputs.

use crate::value::Value;

/// Encode a value into a fresh buffer.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

/// Encode a value, appending to `out`.
pub fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Integer(i) => {
            out.push(b'i');
            // itoa via the formatter; shortest decimal form by construction
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b'e');
        }
        Value::Bytes(bytes) => encode_bytes(bytes, out),
        Value::List(items) => {
            out.push(b'l');
            for item in items {
                encode_into(item, out);
            }
            out.push(b'e');
        }
        Value::Dict(dict) => {
            out.push(b'd');
            for (key, item) in dict.iter() {
                encode_bytes(key, out);
                encode_into(item, out);
            }
            out.push(b'e');
        }
    }
}

fn encode_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Dict;

    #[test]
    fn scalars() {
        assert_eq!(encode(&Value::Integer(0)), b"i0e");
        assert_eq!(encode(&Value::Integer(-42)), b"i-42e");
        assert_eq!(encode(&Value::Integer(i64::MIN)), b"i-9223372036854775808e");
        assert_eq!(encode(&Value::from("spam")), b"4:spam");
        assert_eq!(encode(&Value::Bytes(Vec::new())), b"0:");
    }

    #[test]
    fn containers() {
        let list = Value::List(vec![Value::from("spam"), Value::Integer(42)]);
        assert_eq!(encode(&list), b"l4:spami42ee");

        let mut dict = Dict::new();
        dict.insert("foo", 42i64);
        dict.insert("bar", "spam");
        assert_eq!(encode(&Value::Dict(dict)), b"d3:bar4:spam3:fooi42ee");
    }

    #[test]
    fn dict_encodes_in_key_order_regardless_of_insertion() {
        let mut dict = Dict::new();
        dict.insert("foo", 1i64);
        dict.insert("bar", 2i64);
        dict.insert("baz", 3i64);
        assert_eq!(encode(&Value::Dict(dict)), b"d3:bari2e3:bazi3e3:fooi1ee");
    }
}
