// SPDX-License-Identifier: MIT OR Apache-2.0
//! Schema declaration macros.

/// Declare a message struct together with its wire schema.
///
/// Every field is written `name: Type = order`. Fields are encoded in
/// ascending `order`. An optional `trailing { .. }` block lists fields that
/// always follow the ordered ones (responses use it for their error slot).
///
/// The macro emits the struct, its [`WireMessage`](crate::WireMessage) impl,
/// and the [`Nullable`](crate::Nullable)/[`WireField`](crate::WireField) impls
/// that let the type nest inside other messages. Derives are up to the
/// caller, but [`WireMessage`](crate::WireMessage) requires `Default`.
///
/// ```
/// use bridge_wire::{wire_message, ByteBuffer, WireMessage};
///
/// wire_message! {
///     #[derive(Debug, Clone, Default, PartialEq)]
///     pub struct Greeting {
///         pub name: Option<String> = 1,
///         pub times: i32 = 2,
///     }
/// }
///
/// let mut buf = ByteBuffer::new();
/// Greeting { name: None, times: 3 }.encode_fields(&mut buf).unwrap();
/// assert_eq!(buf.as_slice(), &[0, 3, 0, 0, 0]);
/// ```
#[macro_export]
macro_rules! wire_message {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $fty:ty = $order:literal
            ),* $(,)?
        }
        $(
            trailing {
                $(
                    $(#[$tmeta:meta])*
                    $tvis:vis $tfield:ident : $tty:ty
                ),* $(,)?
            }
        )?
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $fty,
            )*
            $($(
                $(#[$tmeta])*
                $tvis $tfield: $tty,
            )*)?
        }

        impl $crate::WireMessage for $name {
            const NAME: &'static str = stringify!($name);

            #[allow(unused_variables)]
            fn describe(plan: &mut $crate::PlanBuilder<Self>) {
                $(
                    plan.field(
                        stringify!($field),
                        $order,
                        |m, buf| $crate::WireField::encode(&m.$field, buf),
                        |m, dec| {
                            m.$field = $crate::WireField::decode(dec)?;
                            Ok(())
                        },
                    );
                )*
                $($(
                    plan.trailing(
                        stringify!($tfield),
                        |m, buf| $crate::WireField::encode(&m.$tfield, buf),
                        |m, dec| {
                            m.$tfield = $crate::WireField::decode(dec)?;
                            Ok(())
                        },
                    );
                )*)?
            }
        }

        impl $crate::Nullable for $name {
            fn encode_value(&self, buf: &mut $crate::ByteBuffer) -> Result<(), $crate::WireError> {
                $crate::WireMessage::encode_fields(self, buf)
            }

            fn decode_value(dec: &mut $crate::Decoder<'_>) -> Result<Self, $crate::WireError> {
                dec.nested(<Self as $crate::WireMessage>::decode_fields)
            }
        }

        impl $crate::WireField for $name {
            fn encode(&self, buf: &mut $crate::ByteBuffer) -> Result<(), $crate::WireError> {
                $crate::encode_present(self, buf)
            }

            fn decode(dec: &mut $crate::Decoder<'_>) -> Result<Self, $crate::WireError> {
                $crate::decode_present(dec)
            }
        }
    };
}

/// Declare a C-like enum encoded as a bare `i32`.
///
/// Decoding an undeclared discriminant fails with
/// [`WireError::UnknownEnumValue`](crate::WireError::UnknownEnumValue).
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )*
        }

        impl $name {
            /// Every declared variant in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            /// Wire discriminant.
            pub fn as_i32(&self) -> i32 {
                match self {
                    $($name::$variant => $value,)*
                }
            }
        }

        impl ::core::convert::TryFrom<i32> for $name {
            type Error = $crate::WireError;

            fn try_from(value: i32) -> Result<Self, $crate::WireError> {
                match value {
                    $($value => Ok($name::$variant),)*
                    other => Err($crate::WireError::UnknownEnumValue {
                        type_name: stringify!($name),
                        value: other,
                    }),
                }
            }
        }

        impl $crate::WireField for $name {
            fn encode(&self, buf: &mut $crate::ByteBuffer) -> Result<(), $crate::WireError> {
                buf.append_i32(self.as_i32());
                Ok(())
            }

            fn decode(dec: &mut $crate::Decoder<'_>) -> Result<Self, $crate::WireError> {
                <$name as ::core::convert::TryFrom<i32>>::try_from(dec.read_i32()?)
            }
        }
    };
}
