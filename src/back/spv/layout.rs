//! SPIR-V enumerant values this crate needs: execution models,
//! decorations, storage classes, builtins and capabilities. Kept out of
//! `mod.rs` so the writer reads as "assign ids, emit sections" rather
//! than a wall of magic numbers.

use crate::ir::{Builtin, ShaderStage};
use crate::ty::StorageClass;

pub mod execution_model {
    pub const VERTEX: u32 = 0;
    pub const FRAGMENT: u32 = 4;
    pub const GL_COMPUTE: u32 = 5;
}

pub mod execution_mode {
    pub const ORIGIN_UPPER_LEFT: u32 = 7;
}

pub mod decoration {
    pub const BLOCK: u32 = 2;
    pub const BUILT_IN: u32 = 11;
    pub const NON_WRITABLE: u32 = 24;
    pub const LOCATION: u32 = 30;
    pub const BINDING: u32 = 33;
    pub const DESCRIPTOR_SET: u32 = 34;
    pub const OFFSET: u32 = 35;
    pub const ARRAY_STRIDE: u32 = 6;
}

pub mod storage_class {
    pub const UNIFORM_CONSTANT: u32 = 0;
    pub const INPUT: u32 = 1;
    pub const UNIFORM: u32 = 2;
    pub const OUTPUT: u32 = 3;
    pub const WORKGROUP: u32 = 4;
    pub const PUSH_CONSTANT: u32 = 9;
    pub const STORAGE_BUFFER: u32 = 12;
    pub const FUNCTION: u32 = 7;
}

pub mod capability {
    pub const SHADER: u32 = 1;
    pub const INT8: u32 = 39;
    pub const INT16: u32 = 22;
    pub const INT64: u32 = 11;
    pub const FLOAT16: u32 = 9;
    pub const FLOAT64: u32 = 10;
}

pub fn storage_class_word(class: StorageClass) -> u32 {
    match class {
        StorageClass::Function | StorageClass::Parameter => storage_class::FUNCTION,
        StorageClass::Input => storage_class::INPUT,
        StorageClass::Output => storage_class::OUTPUT,
        StorageClass::Uniform => storage_class::UNIFORM,
        StorageClass::UniformConstant => storage_class::UNIFORM_CONSTANT,
        StorageClass::Storage => storage_class::STORAGE_BUFFER,
        StorageClass::PushConstant => storage_class::PUSH_CONSTANT,
        StorageClass::Workgroup => storage_class::WORKGROUP,
    }
}

pub fn execution_model_for(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => execution_model::VERTEX,
        ShaderStage::Fragment => execution_model::FRAGMENT,
        ShaderStage::Compute => execution_model::GL_COMPUTE,
    }
}

/// `builtin(<name>)` attribute values to their SPIR-V `BuiltIn` number.
pub fn builtin_word(builtin: Builtin) -> u32 {
    match builtin {
        Builtin::Position => 0,
        Builtin::VertexId => 5,
        Builtin::InstanceId => 6,
        Builtin::FragCoord => 15,
        Builtin::FragDepth => 22,
        Builtin::NumWorkgroups => 24,
        Builtin::WorkgroupSize => 25,
        Builtin::WorkgroupId => 26,
        Builtin::LocalInvocationId => 27,
        Builtin::VertexIndex => 42,
        Builtin::InstanceIndex => 43,
        Builtin::LocalInvocationIndex => 29,
        Builtin::GlobalInvocationId => 28,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_models_match_stage() {
        assert_eq!(execution_model_for(ShaderStage::Vertex), execution_model::VERTEX);
        assert_eq!(execution_model_for(ShaderStage::Fragment), execution_model::FRAGMENT);
        assert_eq!(execution_model_for(ShaderStage::Compute), execution_model::GL_COMPUTE);
    }

    #[test]
    fn storage_classes_are_distinct() {
        let words = [
            storage_class_word(StorageClass::Function),
            storage_class_word(StorageClass::Input),
            storage_class_word(StorageClass::Output),
            storage_class_word(StorageClass::Uniform),
            storage_class_word(StorageClass::UniformConstant),
            storage_class_word(StorageClass::Storage),
            storage_class_word(StorageClass::PushConstant),
            storage_class_word(StorageClass::Workgroup),
        ];
        for (i, a) in words.iter().enumerate() {
            for (j, b) in words.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "storage classes {i} and {j} collide");
                }
            }
        }
    }

    #[test]
    fn position_and_frag_coord_builtins_differ() {
        assert_ne!(builtin_word(Builtin::Position), builtin_word(Builtin::FragCoord));
    }
}
