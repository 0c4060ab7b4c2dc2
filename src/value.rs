use crate::module::ValType;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn default_for(ty: &ValType) -> Self {
        match ty {
            ValType::I32 => Value::I32(0),
            ValType::I64 => Value::I64(0),
            ValType::F32 => Value::F32(0.0),
            ValType::F64 => Value::F64(0.0),
        }
    }

    pub fn ty(&self) -> ValType {
        match self {
            Value::I32(_) => ValType::I32,
            Value::I64(_) => ValType::I64,
            Value::F32(_) => ValType::F32,
            Value::F64(_) => ValType::F64,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
        }
    }
}

/// Rust types that map onto a single wasm value type.
pub trait WasmTy: Sized {
    const TYPE: ValType;

    fn into_value(self) -> Value;
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! wasm_ty {
    ($rust:ty, $variant:ident) => {
        impl WasmTy for $rust {
            const TYPE: ValType = ValType::$variant;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

wasm_ty!(i32, I32);
wasm_ty!(i64, I64);
wasm_ty!(f32, F32);
wasm_ty!(f64, F64);

pub trait WasmParams {
    fn types() -> Vec<ValType>;
    fn into_values(self) -> Vec<Value>;
}

pub trait WasmResults: Sized {
    fn types() -> Vec<ValType>;
    fn from_values(values: &[Value]) -> Option<Self>;
}

impl<T: WasmTy> WasmParams for T {
    fn types() -> Vec<ValType> {
        vec![T::TYPE]
    }

    fn into_values(self) -> Vec<Value> {
        vec![self.into_value()]
    }
}

impl<T: WasmTy> WasmResults for T {
    fn types() -> Vec<ValType> {
        vec![T::TYPE]
    }

    fn from_values(values: &[Value]) -> Option<Self> {
        match values {
            [value] => T::from_value(*value),
            _ => None,
        }
    }
}

macro_rules! wasm_tuple {
    ($($t:ident),*) => {
        #[allow(non_snake_case, unused_mut)]
        impl<$($t: WasmTy),*> WasmParams for ($($t,)*) {
            fn types() -> Vec<ValType> {
                vec![$($t::TYPE),*]
            }

            fn into_values(self) -> Vec<Value> {
                let ($($t,)*) = self;
                vec![$($t.into_value()),*]
            }
        }

        #[allow(non_snake_case, unused_mut)]
        impl<$($t: WasmTy),*> WasmResults for ($($t,)*) {
            fn types() -> Vec<ValType> {
                vec![$($t::TYPE),*]
            }

            fn from_values(values: &[Value]) -> Option<Self> {
                let mut iter = values.iter().copied();
                let out = ($($t::from_value(iter.next()?)?,)*);
                match iter.next() {
                    None => Some(out),
                    Some(_) => None,
                }
            }
        }
    };
}

wasm_tuple!();
wasm_tuple!(A);
wasm_tuple!(A, B);
wasm_tuple!(A, B, C);
wasm_tuple!(A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_results_accept_only_empty() {
        assert_eq!(<()>::from_values(&[]), Some(()));
        assert_eq!(<()>::from_values(&[Value::I32(1)]), None);
    }

    #[test]
    fn single_result_checks_type() {
        assert_eq!(i32::from_values(&[Value::I32(7)]), Some(7));
        assert_eq!(i32::from_values(&[Value::I64(7)]), None);
        assert_eq!(i32::from_values(&[]), None);
    }

    #[test]
    fn tuple_params_flatten_in_order() {
        assert_eq!(
            (1i32, 2i32, 3i32).into_values(),
            vec![Value::I32(1), Value::I32(2), Value::I32(3)]
        );
        assert_eq!(
            <(i32, i64) as WasmParams>::types(),
            vec![ValType::I32, ValType::I64]
        );
    }
}
