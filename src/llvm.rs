//! LLVM backend. Needs a system LLVM 8 and the `llvm` cargo feature.

use super::backend::{ArithOp, Backend};
use super::error::{ErrorKind, Result};
use libc::{c_char, c_uint};
use llvm_sys::analysis::{LLVMVerifierFailureAction, LLVMVerifyFunction, LLVMVerifyModule};
use llvm_sys::execution_engine::{
    LLVMCreateInterpreterForModule, LLVMDisposeExecutionEngine, LLVMDisposeGenericValue,
    LLVMExecutionEngineRef, LLVMGenericValueToFloat, LLVMLinkInInterpreter, LLVMRunFunction,
};
use llvm_sys::prelude::*;
use llvm_sys::{core, target, LLVMRealPredicate};
use std::ffi::{CStr, CString};
use std::ptr::null_mut;

const ADDTMP: &[u8] = b"addtmp\0";
const SUBTMP: &[u8] = b"subtmp\0";
const MULTMP: &[u8] = b"multmp\0";
const DIVTMP: &[u8] = b"divtmp\0";
const CMPTMP: &[u8] = b"cmptmp\0";
const BOOLTMP: &[u8] = b"booltmp\0";
const IFCOND: &[u8] = b"ifcond\0";
const IFTMP: &[u8] = b"iftmp\0";
const CALLTMP: &[u8] = b"calltmp\0";

fn name_ptr(bytes: &'static [u8]) -> *const c_char {
    bytes.as_ptr() as *const c_char
}

fn c_string(s: &str) -> Result<CString> {
    CString::new(s).map_err(|e| ErrorKind::Backend(e.to_string()).into())
}

unsafe fn take_message(msg: *mut c_char) -> String {
    if msg.is_null() {
        return String::new();
    }
    let s = CStr::from_ptr(msg).to_string_lossy().into_owned();
    core::LLVMDisposeMessage(msg);
    s
}

/// Owns an LLVM context, module and builder. The execution engine is
/// created on first use and takes over the module.
pub struct LlvmBackend {
    context: LLVMContextRef,
    module: LLVMModuleRef,
    builder: LLVMBuilderRef,
    double_type: LLVMTypeRef,
    engine: Option<LLVMExecutionEngineRef>,
}

impl LlvmBackend {
    pub fn new(module_name: &str) -> Result<LlvmBackend> {
        let name = c_string(module_name)?;
        unsafe {
            if target::LLVM_InitializeNativeTarget() != 0 {
                return Err(ErrorKind::Backend("cannot initialize native target".to_owned()).into());
            }
            LLVMLinkInInterpreter();
            let context = core::LLVMContextCreate();
            let module = core::LLVMModuleCreateWithNameInContext(name.as_ptr(), context);
            let builder = core::LLVMCreateBuilderInContext(context);
            let double_type = core::LLVMDoubleTypeInContext(context);
            Ok(LlvmBackend {
                context,
                module,
                builder,
                double_type,
                engine: None,
            })
        }
    }

    fn engine(&mut self) -> Result<LLVMExecutionEngineRef> {
        if let Some(ee) = self.engine {
            return Ok(ee);
        }
        let mut ee = null_mut();
        let mut err = null_mut();
        unsafe {
            if LLVMCreateInterpreterForModule(&mut ee, self.module, &mut err) != 0 {
                return Err(ErrorKind::Backend(take_message(err)).into());
            }
        }
        self.engine = Some(ee);
        Ok(ee)
    }

    fn function_name(&self, function: LLVMValueRef) -> String {
        unsafe {
            let mut len = 0;
            let ptr = core::LLVMGetValueName2(function, &mut len);
            if ptr.is_null() {
                return String::new();
            }
            String::from_utf8_lossy(std::slice::from_raw_parts(ptr as *const u8, len)).into_owned()
        }
    }
}

impl Drop for LlvmBackend {
    fn drop(&mut self) {
        unsafe {
            core::LLVMDisposeBuilder(self.builder);
            match self.engine {
                Some(ee) => LLVMDisposeExecutionEngine(ee),
                None => core::LLVMDisposeModule(self.module),
            }
            core::LLVMContextDispose(self.context);
        }
    }
}

impl Backend for LlvmBackend {
    type Value = LLVMValueRef;
    type Function = LLVMValueRef;
    type Block = LLVMBasicBlockRef;

    fn real_constant(&mut self, value: f64) -> LLVMValueRef {
        unsafe { core::LLVMConstReal(self.double_type, value) }
    }

    fn declare_function(&mut self, name: &str, arity: usize) -> Result<LLVMValueRef> {
        let c_name = c_string(name)?;
        let mut params = vec![self.double_type; arity];
        unsafe {
            let ft = core::LLVMFunctionType(
                self.double_type,
                params.as_mut_ptr(),
                params.len() as c_uint,
                0,
            );
            Ok(core::LLVMAddFunction(self.module, c_name.as_ptr(), ft))
        }
    }

    fn param(&self, function: LLVMValueRef, index: usize) -> Result<LLVMValueRef> {
        unsafe {
            if index >= core::LLVMCountParams(function) as usize {
                return Err(ErrorKind::Backend(format!(
                    "'{}' has no parameter #{}",
                    self.function_name(function),
                    index
                ))
                .into());
            }
            Ok(core::LLVMGetParam(function, index as c_uint))
        }
    }

    fn remove_function(&mut self, function: LLVMValueRef) {
        unsafe { core::LLVMDeleteFunction(function) }
    }

    fn create_block(&mut self, function: LLVMValueRef, label: &str) -> Result<LLVMBasicBlockRef> {
        let c_label = c_string(label)?;
        Ok(unsafe { core::LLVMAppendBasicBlockInContext(self.context, function, c_label.as_ptr()) })
    }

    fn position(&mut self, block: LLVMBasicBlockRef) {
        unsafe { core::LLVMPositionBuilderAtEnd(self.builder, block) }
    }

    fn arith(&mut self, op: ArithOp, lhs: LLVMValueRef, rhs: LLVMValueRef) -> Result<LLVMValueRef> {
        unsafe {
            Ok(match op {
                ArithOp::Add => core::LLVMBuildFAdd(self.builder, lhs, rhs, name_ptr(ADDTMP)),
                ArithOp::Sub => core::LLVMBuildFSub(self.builder, lhs, rhs, name_ptr(SUBTMP)),
                ArithOp::Mul => core::LLVMBuildFMul(self.builder, lhs, rhs, name_ptr(MULTMP)),
                ArithOp::Div => core::LLVMBuildFDiv(self.builder, lhs, rhs, name_ptr(DIVTMP)),
            })
        }
    }

    fn compare_lt(&mut self, lhs: LLVMValueRef, rhs: LLVMValueRef) -> Result<LLVMValueRef> {
        Ok(unsafe {
            core::LLVMBuildFCmp(
                self.builder,
                LLVMRealPredicate::LLVMRealULT,
                lhs,
                rhs,
                name_ptr(CMPTMP),
            )
        })
    }

    fn compare_ne_zero(&mut self, value: LLVMValueRef) -> Result<LLVMValueRef> {
        let zero = self.real_constant(0.0);
        Ok(unsafe {
            core::LLVMBuildFCmp(
                self.builder,
                LLVMRealPredicate::LLVMRealONE,
                value,
                zero,
                name_ptr(IFCOND),
            )
        })
    }

    fn bool_to_real(&mut self, value: LLVMValueRef) -> Result<LLVMValueRef> {
        Ok(unsafe {
            core::LLVMBuildUIToFP(self.builder, value, self.double_type, name_ptr(BOOLTMP))
        })
    }

    fn branch(&mut self, target: LLVMBasicBlockRef) -> Result<()> {
        unsafe { core::LLVMBuildBr(self.builder, target) };
        Ok(())
    }

    fn cond_branch(
        &mut self,
        cond: LLVMValueRef,
        then_block: LLVMBasicBlockRef,
        else_block: LLVMBasicBlockRef,
    ) -> Result<()> {
        unsafe { core::LLVMBuildCondBr(self.builder, cond, then_block, else_block) };
        Ok(())
    }

    fn phi(&mut self, incoming: &[(LLVMValueRef, LLVMBasicBlockRef)]) -> Result<LLVMValueRef> {
        let mut values: Vec<LLVMValueRef> = incoming.iter().map(|(v, _)| *v).collect();
        let mut blocks: Vec<LLVMBasicBlockRef> = incoming.iter().map(|(_, b)| *b).collect();
        unsafe {
            let phi = core::LLVMBuildPhi(self.builder, self.double_type, name_ptr(IFTMP));
            core::LLVMAddIncoming(
                phi,
                values.as_mut_ptr(),
                blocks.as_mut_ptr(),
                incoming.len() as c_uint,
            );
            Ok(phi)
        }
    }

    fn call(&mut self, callee: LLVMValueRef, args: &[LLVMValueRef]) -> Result<LLVMValueRef> {
        let mut args = args.to_vec();
        Ok(unsafe {
            core::LLVMBuildCall(
                self.builder,
                callee,
                args.as_mut_ptr(),
                args.len() as c_uint,
                name_ptr(CALLTMP),
            )
        })
    }

    fn ret(&mut self, value: LLVMValueRef) -> Result<()> {
        unsafe { core::LLVMBuildRet(self.builder, value) };
        Ok(())
    }

    fn verify(&mut self, function: LLVMValueRef) -> Result<()> {
        unsafe {
            if LLVMVerifyFunction(function, LLVMVerifierFailureAction::LLVMReturnStatusAction) == 0 {
                return Ok(());
            }
            let mut msg = null_mut();
            LLVMVerifyModule(
                self.module,
                LLVMVerifierFailureAction::LLVMReturnStatusAction,
                &mut msg,
            );
            Err(ErrorKind::Verification {
                function: self.function_name(function),
                reason: take_message(msg).trim_end().to_owned(),
            }
            .into())
        }
    }

    fn execute(&mut self, function: LLVMValueRef) -> Result<f64> {
        let ee = self.engine()?;
        unsafe {
            let result = LLVMRunFunction(ee, function, 0, null_mut());
            let v = LLVMGenericValueToFloat(self.double_type, result);
            LLVMDisposeGenericValue(result);
            Ok(v)
        }
    }

    fn render(&self) -> String {
        unsafe { take_message(core::LLVMPrintModuleToString(self.module)) }
    }
}
