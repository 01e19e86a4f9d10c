/*
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

/// Declares a group of named `usize`-shaped constants with a `.d()` accessor for the raw
/// discriminant and a `.name()` accessor for debugging. Used for the reserved HTM abort codes
/// and the soft node-type tags.
macro_rules! constgrp {
    ($(#[$attr:meta])* $vis:vis struct $group:ident: $ty:ty { $($const:ident = $expr:expr),* $(,)?}) => (
        $(#[$attr])* $vis struct $group {r#const: $ty}
        impl $group {
            $(pub const $const: Self = Self { r#const: $expr };)*
            #[inline(always)] pub const fn d(&self) -> $ty { self.r#const }
            #[inline(always)] pub const fn name(&self) -> &'static str {
                match self.r#const {$(capture if capture == $expr => ::core::stringify!($const),)* _ => "unknown"}
            }
        }
        impl ::core::fmt::Debug for $group {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::write!(f, "{}::{}", ::core::stringify!($group), Self::name(self))
            }
        }
        impl ::core::cmp::PartialEq for $group {
            fn eq(&self, other: &Self) -> bool { self.r#const == other.r#const }
        }
        impl ::core::cmp::Eq for $group {}
        impl ::core::clone::Clone for $group {
            fn clone(&self) -> Self { Self { r#const: self.r#const } }
        }
        impl ::core::marker::Copy for $group {}
    );
}

macro_rules! assertions {
    ($($assert:expr),*$(,)?) => {$(const _:()=::core::assert!($assert);)*}
}

/// Build-debug-only instrumentation: the real field/body on `#[cfg(debug_assertions)]`, a
/// zero-cost stand-in otherwise.
macro_rules! dbgfn {
    ($(fn $name:ident(self: &Self $(, $arg:ident: $argty:ty)*) $(-> $ret:ty)? { $debug:block } else { $release:block })*) => {
        $(
            #[cfg(debug_assertions)]
            #[inline]
            fn $name(&self $(, $arg: $argty)*) $(-> $ret)? { $debug }
            #[cfg(not(debug_assertions))]
            #[inline(always)]
            #[allow(unused_variables)]
            fn $name(&self $(, $arg: $argty)*) $(-> $ret)? { $release }
        )*
    };
}

pub(crate) use {assertions, constgrp, dbgfn};
