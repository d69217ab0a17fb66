/*!
Character tables for the `vregex` pattern engines.

## Features
- [ASCII class bits](ascii): constant-time `word`/`ident`/`hex`/... predicates
- [Case conversion and simple folding](case)
- Composing-character detection ([`case::is_composing`])
- [Equivalence classes](equiv) for `[[=a=]]` collection items
*/
pub mod ascii;
pub mod case;
pub mod equiv;

mod private {
    pub trait Sealed {}
}
use private::Sealed;

impl Sealed for char {}
impl Sealed for str {}
