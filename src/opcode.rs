/// OpCode is a one-byte number that specifies the type of an instruction.
///
/// # Notes
///
/// There is no `OpCode::NotEqual`: `a != b` is lowered to `a == b` followed
/// by `Not`, and the same trick covers `<=` and `>=`. Per [IEEE 754] every
/// comparison on a `NaN` operand is `false`, so `a <= b` is not strictly
/// equivalent to `!(a > b)`; the language accepts this deviation.
///
/// [IEEE 754]: https://en.wikipedia.org/wiki/IEEE_754
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Load a constant; one operand byte indexing the constant pool
    Constant = 0,
    /// Load a `nil` value
    Nil = 1,
    /// Load a `true` value
    True = 2,
    /// Load a `false` value
    False = 3,
    /// Pop the top of the stack
    Pop = 4,
    /// Push a global's value, or `nil` when undefined; one name-constant operand
    GetGlobal = 5,
    /// Write the top of the stack to a global, leaving it on the stack; one name-constant operand
    SetGlobal = 6,
    /// Pop the top of the stack into a new or existing global; one name-constant operand
    DefineGlobal = 7,
    /// Check two operands for structural equality
    Equal = 8,
    /// Compare if the first operand is greater than the second
    Greater = 9,
    /// Compare if the first operand is less than the second
    Less = 10,
    /// Add two number operands
    Add = 11,
    /// Subtract two number operands
    Subtract = 12,
    /// Multiply two number operands
    Multiply = 13,
    /// Divide two number operands
    Divide = 14,
    /// Replace the top of the stack with its falsiness
    Not = 15,
    /// Negate a single number operand
    Negate = 16,
    /// Pop and print the top of the stack followed by a newline
    Print = 17,
    /// Jump forward; two big-endian operand bytes
    Jump = 18,
    /// Jump forward when the top of the stack is falsey, without popping it;
    /// two big-endian operand bytes
    JumpIfFalse = 19,
    /// Jump backward; two big-endian operand bytes
    Loop = 20,
    /// Halt the machine with success
    Return = 21,
}

impl OpCode {
    /// The opcode's conventional mnemonic, used by the disassembler.
    pub fn name(self) -> &'static str {
        match self {
            Self::Constant => "OP_CONSTANT",
            Self::Nil => "OP_NIL",
            Self::True => "OP_TRUE",
            Self::False => "OP_FALSE",
            Self::Pop => "OP_POP",
            Self::GetGlobal => "OP_GET_GLOBAL",
            Self::SetGlobal => "OP_SET_GLOBAL",
            Self::DefineGlobal => "OP_DEFINE_GLOBAL",
            Self::Equal => "OP_EQUAL",
            Self::Greater => "OP_GREATER",
            Self::Less => "OP_LESS",
            Self::Add => "OP_ADD",
            Self::Subtract => "OP_SUBTRACT",
            Self::Multiply => "OP_MULTIPLY",
            Self::Divide => "OP_DIVIDE",
            Self::Not => "OP_NOT",
            Self::Negate => "OP_NEGATE",
            Self::Print => "OP_PRINT",
            Self::Jump => "OP_JUMP",
            Self::JumpIfFalse => "OP_JUMP_IF_FALSE",
            Self::Loop => "OP_LOOP",
            Self::Return => "OP_RETURN",
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        Ok(match byte {
            0 => Self::Constant,
            1 => Self::Nil,
            2 => Self::True,
            3 => Self::False,
            4 => Self::Pop,
            5 => Self::GetGlobal,
            6 => Self::SetGlobal,
            7 => Self::DefineGlobal,
            8 => Self::Equal,
            9 => Self::Greater,
            10 => Self::Less,
            11 => Self::Add,
            12 => Self::Subtract,
            13 => Self::Multiply,
            14 => Self::Divide,
            15 => Self::Not,
            16 => Self::Negate,
            17 => Self::Print,
            18 => Self::Jump,
            19 => Self::JumpIfFalse,
            20 => Self::Loop,
            21 => Self::Return,
            byte => return Err(byte),
        })
    }
}
