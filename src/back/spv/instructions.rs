//! Low-level SPIR-V instruction encoding.
//!
//! Grounded on the builder pattern the teacher's SPIR-V back end uses:
//! `Instruction::new(op)`, then `set_result`/`add_operand*`, then
//! `to_words` appends the encoded instruction to a section's word
//! vector. Keeping this separate from `mod.rs` lets the writer build
//! instructions without hand-packing opcode headers everywhere.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum Op {
    Nop = 0,
    Source = 3,
    Name = 5,
    Extension = 10,
    MemberName = 6,
    ExtInstImport = 11,
    ExtInst = 12,
    MemoryModel = 14,
    EntryPoint = 15,
    ExecutionMode = 16,
    Capability = 17,
    TypeVoid = 19,
    TypeBool = 20,
    TypeInt = 21,
    TypeFloat = 22,
    TypeVector = 23,
    TypeMatrix = 24,
    TypeImage = 25,
    TypeSampler = 26,
    TypeSampledImage = 27,
    TypeArray = 28,
    TypeRuntimeArray = 29,
    TypeStruct = 30,
    TypePointer = 32,
    TypeFunction = 33,
    ConstantTrue = 41,
    ConstantFalse = 42,
    Constant = 43,
    ConstantComposite = 44,
    Function = 54,
    FunctionParameter = 55,
    FunctionEnd = 56,
    FunctionCall = 57,
    Variable = 59,
    Load = 61,
    Store = 62,
    AccessChain = 65,
    Decorate = 71,
    MemberDecorate = 72,
    VectorShuffle = 79,
    CompositeConstruct = 80,
    CompositeExtract = 81,
    ArrayLength = 68,
    ConvertFToU = 109,
    ConvertFToS = 110,
    ConvertSToF = 111,
    ConvertUToF = 112,
    UConvert = 113,
    SConvert = 114,
    FConvert = 115,
    Bitcast = 124,
    SNegate = 126,
    FNegate = 127,
    IAdd = 128,
    FAdd = 129,
    ISub = 130,
    FSub = 131,
    IMul = 132,
    FMul = 133,
    UDiv = 134,
    SDiv = 135,
    FDiv = 136,
    UMod = 137,
    SMod = 139,
    FMod = 141,
    VectorTimesScalar = 142,
    MatrixTimesScalar = 143,
    VectorTimesMatrix = 144,
    MatrixTimesVector = 145,
    MatrixTimesMatrix = 146,
    Dot = 148,
    Any = 150,
    All = 151,
    LogicalOr = 166,
    LogicalAnd = 167,
    LogicalNot = 168,
    IEqual = 170,
    INotEqual = 171,
    UGreaterThan = 172,
    SGreaterThan = 173,
    UGreaterThanEqual = 174,
    SGreaterThanEqual = 175,
    ULessThan = 176,
    SLessThan = 177,
    ULessThanEqual = 178,
    SLessThanEqual = 179,
    FOrdEqual = 180,
    FOrdNotEqual = 182,
    FOrdLessThan = 184,
    FOrdGreaterThan = 186,
    FOrdLessThanEqual = 188,
    FOrdGreaterThanEqual = 190,
    ShiftRightLogical = 194,
    ShiftRightArithmetic = 195,
    ShiftLeftLogical = 196,
    BitwiseOr = 197,
    BitwiseXor = 198,
    BitwiseAnd = 199,
    Not = 200,
    Phi = 245,
    LoopMerge = 246,
    SelectionMerge = 247,
    Label = 248,
    Branch = 249,
    BranchConditional = 250,
    Kill = 252,
    Return = 253,
    ReturnValue = 254,
}

pub const GLSL_STD_450_SET: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum GlslExt {
    Round = 1,
    FAbs = 4,
    SAbs = 5,
    Floor = 8,
    Ceil = 9,
    Fract = 10,
    Radians = 11,
    Degrees = 12,
    Sin = 13,
    Cos = 14,
    Tan = 15,
    Asin = 16,
    Acos = 17,
    Atan = 18,
    Sinh = 19,
    Cosh = 20,
    Tanh = 21,
    Asinh = 22,
    Acosh = 23,
    Atanh = 24,
    Pow = 26,
    Exp = 27,
    Log = 28,
    Exp2 = 29,
    Log2 = 30,
    Sqrt = 31,
    Determinant = 33,
    MatrixInverse = 34,
    FMin = 37,
    UMin = 38,
    SMin = 39,
    FMax = 40,
    UMax = 41,
    SMax = 42,
    FClamp = 43,
    UClamp = 44,
    SClamp = 45,
    FMix = 46,
    Length = 66,
    Distance = 67,
    Cross = 68,
    Normalize = 69,
    Reflect = 71,
    Refract = 72,
}

#[derive(Debug)]
pub enum Operand {
    Word(u32),
    String(String),
}

#[derive(Debug)]
pub struct Instruction {
    op: Op,
    type_id: Option<u32>,
    result_id: Option<u32>,
    operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(op: Op) -> Self {
        Instruction {
            op,
            type_id: None,
            result_id: None,
            operands: Vec::new(),
        }
    }

    pub fn set_type(&mut self, id: u32) -> &mut Self {
        self.type_id = Some(id);
        self
    }

    pub fn set_result(&mut self, id: u32) -> &mut Self {
        self.result_id = Some(id);
        self
    }

    pub fn add_operand(&mut self, word: u32) -> &mut Self {
        self.operands.push(Operand::Word(word));
        self
    }

    pub fn add_operands(&mut self, words: impl IntoIterator<Item = u32>) -> &mut Self {
        self.operands.extend(words.into_iter().map(Operand::Word));
        self
    }

    pub fn add_string(&mut self, text: &str) -> &mut Self {
        self.operands.push(Operand::String(text.to_string()));
        self
    }

    /// Word count of the string operand once packed little-endian,
    /// NUL-terminated and padded to 4 bytes.
    fn string_word_count(text: &str) -> u32 {
        (text.len() as u32 / 4) + 1
    }

    pub fn word_count(&self) -> u32 {
        let mut count = 1; // opcode + word-count header
        if self.type_id.is_some() {
            count += 1;
        }
        if self.result_id.is_some() {
            count += 1;
        }
        for operand in &self.operands {
            count += match operand {
                Operand::Word(_) => 1,
                Operand::String(s) => Self::string_word_count(s),
            };
        }
        count
    }

    pub fn to_words(&self, sink: &mut Vec<u32>) {
        let word_count = self.word_count();
        sink.push((word_count << 16) | (self.op as u32));
        if let Some(t) = self.type_id {
            sink.push(t);
        }
        if let Some(r) = self.result_id {
            sink.push(r);
        }
        for operand in &self.operands {
            match operand {
                Operand::Word(w) => sink.push(*w),
                Operand::String(s) => push_string(sink, s),
            }
        }
    }
}

fn push_string(sink: &mut Vec<u32>, text: &str) {
    let bytes = text.as_bytes();
    let mut i = 0;
    loop {
        let mut chunk = [0u8; 4];
        let n = (bytes.len() - i).min(4);
        chunk[..n].copy_from_slice(&bytes[i..i + n]);
        sink.push(u32::from_le_bytes(chunk));
        i += n;
        if n < 4 {
            return;
        }
    }
}

pub fn instruction_capability(capability: u32) -> Instruction {
    let mut inst = Instruction::new(Op::Capability);
    inst.add_operand(capability);
    inst
}

pub fn instruction_ext_inst_import(result_id: u32) -> Instruction {
    let mut inst = Instruction::new(Op::ExtInstImport);
    inst.set_result(result_id);
    inst.add_string("GLSL.std.450");
    inst
}

pub fn instruction_memory_model() -> Instruction {
    let mut inst = Instruction::new(Op::MemoryModel);
    inst.add_operand(0); // Logical
    inst.add_operand(1); // GLSL450
    inst
}

pub fn instruction_entry_point(
    execution_model: u32,
    function_id: u32,
    name: &str,
    interface: &[u32],
) -> Instruction {
    let mut inst = Instruction::new(Op::EntryPoint);
    inst.add_operand(execution_model);
    inst.add_operand(function_id);
    inst.add_string(name);
    inst.add_operands(interface.iter().copied());
    inst
}

pub fn instruction_execution_mode(function_id: u32, mode: u32) -> Instruction {
    let mut inst = Instruction::new(Op::ExecutionMode);
    inst.add_operand(function_id);
    inst.add_operand(mode);
    inst
}

pub fn instruction_source() -> Instruction {
    let mut inst = Instruction::new(Op::Source);
    inst.add_operand(2); // GLSL
    inst.add_operand(450);
    inst
}

pub fn instruction_decorate(target: u32, decoration: u32, extra: &[u32]) -> Instruction {
    let mut inst = Instruction::new(Op::Decorate);
    inst.add_operand(target);
    inst.add_operand(decoration);
    inst.add_operands(extra.iter().copied());
    inst
}

pub fn instruction_member_decorate(
    target: u32,
    member: u32,
    decoration: u32,
    extra: &[u32],
) -> Instruction {
    let mut inst = Instruction::new(Op::MemberDecorate);
    inst.add_operand(target);
    inst.add_operand(member);
    inst.add_operand(decoration);
    inst.add_operands(extra.iter().copied());
    inst
}

pub fn instruction_label(result_id: u32) -> Instruction {
    let mut inst = Instruction::new(Op::Label);
    inst.set_result(result_id);
    inst
}
