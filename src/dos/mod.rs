// these modules are re-exported as a single module

pub use self::int21::*;
mod int21;
