// Mon Feb 2 2026 - Alex

use crate::types::Value;

/// One argument of a template instantiation. The serialized key built from
/// a list of these is the identity of a specialization: two argument lists
/// that encode to the same key name the same specialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateArg {
    /// A type identity, by persistent type id.
    Type(u32),
    /// A non-type integer parameter.
    Int(i64),
    /// A string parameter.
    Str(String),
}

/// Canonical key encoding. Writer, reader and dispatch must all use this
/// exact encoding or specialization lookups will miss.
pub fn template_key(args: &[TemplateArg]) -> String {
    let mut key = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            key.push(',');
        }
        match arg {
            TemplateArg::Type(id) => {
                key.push('t');
                key.push_str(&id.to_string());
            }
            TemplateArg::Int(v) => {
                key.push('i');
                key.push_str(&v.to_string());
            }
            TemplateArg::Str(s) => {
                key.push('s');
                key.push_str(&s.len().to_string());
                key.push(':');
                key.push_str(s);
            }
        }
    }
    key
}

/// Try to serialize actual call arguments into a template key. Only
/// type-identity and integer arguments have a stable encoding; anything
/// else returns None and the caller falls back to a full overload scan.
pub fn template_key_from_values(args: &[Value]) -> Option<String> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Type(id) => out.push(TemplateArg::Type(*id)),
            Value::Int(v) => out.push(TemplateArg::Int(*v)),
            Value::Str(s) => out.push(TemplateArg::Str(s.clone())),
            _ => return None,
        }
    }
    Some(template_key(&out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_deterministic() {
        let args = vec![TemplateArg::Type(7), TemplateArg::Int(-3)];
        assert_eq!(template_key(&args), template_key(&args));
        assert_eq!(template_key(&args), "t7,i-3");
    }

    #[test]
    fn test_distinct_args_distinct_keys() {
        let a = template_key(&[TemplateArg::Type(1), TemplateArg::Type(2)]);
        let b = template_key(&[TemplateArg::Type(12)]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_string_args_are_length_prefixed() {
        let a = template_key(&[TemplateArg::Str("a,b".into())]);
        let b = template_key(&[TemplateArg::Str("a".into()), TemplateArg::Str("b".into())]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_values_serialize_when_type_identities() {
        let key = template_key_from_values(&[Value::Type(4), Value::Int(8)]);
        assert_eq!(key.as_deref(), Some("t4,i8"));
    }

    #[test]
    fn test_values_fail_on_non_identity() {
        assert!(template_key_from_values(&[Value::Float(1.5)]).is_none());
        assert!(template_key_from_values(&[Value::Ptr(0x1000)]).is_none());
    }
}
