//! Target operators and their precedence

use derive_more::Display;

/// Binary operators of the target language
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Display)]
pub enum BinOp {
    /// `or`
    #[display("or")]
    Or,
    /// `and`
    #[display("and")]
    And,
    /// `<`
    #[display("<")]
    Lt,
    /// `>`
    #[display(">")]
    Gt,
    /// `<=`
    #[display("<=")]
    Le,
    /// `>=`
    #[display(">=")]
    Ge,
    /// `~=`
    #[display("~=")]
    Ne,
    /// `==`
    #[display("==")]
    Eq,
    /// `|`
    #[display("|")]
    BitOr,
    /// `~`
    #[display("~")]
    BitXor,
    /// `&`
    #[display("&")]
    BitAnd,
    /// `<<`
    #[display("<<")]
    Shl,
    /// `>>`
    #[display(">>")]
    Shr,
    /// `..`
    #[display("..")]
    Concat,
    /// `+`
    #[display("+")]
    Add,
    /// `-`
    #[display("-")]
    Sub,
    /// `*`
    #[display("*")]
    Mul,
    /// `/`
    #[display("/")]
    Div,
    /// `//`
    #[display("//")]
    FloorDiv,
    /// `%`
    #[display("%")]
    Mod,
    /// `^`
    #[display("^")]
    Pow,
}

impl BinOp {
    /// Binding strength; higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Lt | Self::Gt | Self::Le | Self::Ge | Self::Ne | Self::Eq => 3,
            Self::BitOr => 4,
            Self::BitXor => 5,
            Self::BitAnd => 6,
            Self::Shl | Self::Shr => 7,
            Self::Concat => 8,
            Self::Add | Self::Sub => 9,
            Self::Mul | Self::Div | Self::FloorDiv | Self::Mod => 10,
            Self::Pow => 12,
        }
    }

    /// Right-associative operators
    pub fn is_right_assoc(self) -> bool {
        matches!(self, Self::Concat | Self::Pow)
    }

    /// Whether the operator yields a boolean
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Lt | Self::Gt | Self::Le | Self::Ge | Self::Ne | Self::Eq)
    }
}

/// Unary operators of the target language
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Display)]
pub enum UnOp {
    /// `not`
    #[display("not ")]
    Not,
    /// `-`
    #[display("-")]
    Neg,
    /// `#`
    #[display("#")]
    Len,
    /// `~`
    #[display("~")]
    BitNot,
}

impl UnOp {
    /// Binding strength of all unary operators
    pub const PRECEDENCE: u8 = 11;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_ordering() {
        assert!(BinOp::Mul.precedence() > BinOp::Add.precedence());
        assert!(BinOp::Concat.precedence() > BinOp::Eq.precedence());
        assert!(BinOp::And.precedence() > BinOp::Or.precedence());
        assert!(UnOp::PRECEDENCE < BinOp::Pow.precedence());
    }

    #[test]
    fn test_operator_tokens() {
        assert_eq!(BinOp::Ne.to_string(), "~=");
        assert_eq!(BinOp::FloorDiv.to_string(), "//");
        assert_eq!(UnOp::Not.to_string(), "not ");
    }
}
