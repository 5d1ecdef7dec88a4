//! WASM backend for scheduled functions.
//!
//! Every source function becomes one exported wasm function
//! `(fuel: i32) -> i32` whose result is the number of blocks executed.
//! The blocks are laid out in emission order inside a dispatch loop:
//!
//! ```text
//! block $done
//!   loop $dispatch
//!     block ;; position n-1
//!       ...
//!         block ;; position 0
//!           local.get $current
//!           br_table ...        ;; block index -> position
//!         end
//!         <code at position 0>
//!       ...
//!     end
//!     <code at position n-1>
//!   end
//! end
//! <deferred calls>
//! ```
//!
//! Falling off the code at position `p` enters position `p + 1`, so a jump
//! to the block's `next` needs no instruction at all. Any other jump
//! stores the target in `$current` and branches back to `$dispatch`.

use wasm_encoder::{
    BlockType, CodeSection, EntityType, ExportKind, ExportSection, Function as WasmFunction,
    FunctionSection, ImportSection, Instruction, Module, TypeSection, ValType,
};

use crate::builtins::{BuiltinKind, builtin};
use crate::cfg::{BlockId, DeferId};
use crate::classify::ActionKind;
use crate::compiler::PlannedFunction;

// Local layout shared by every generated function.
const FUEL: u32 = 0;
const CURRENT: u32 = 1;
const STEPS: u32 = 2;
const SELECTOR: u32 = 3;
/// One flag or counter per block follows the fixed locals.
const FIRST_SLOT: u32 = 4;

/// Function index of the imported `defer_run` hook.
const DEFER_HOOK: u32 = 0;

/// Generate a wasm module exporting every planned function by name.
pub fn generate_wasm(functions: &[PlannedFunction]) -> Vec<u8> {
    let hook = builtin(BuiltinKind::DeferRun);
    let mut module = Module::new();

    // Type section: the hook, then (i32) -> i32 for every function
    let mut types = TypeSection::new();
    let hook_type = types.len();
    types
        .ty()
        .function(hook.params.iter().copied(), hook.results.iter().copied());
    let entry_type = types.len();
    types.ty().function([ValType::I32], [ValType::I32]);
    module.section(&types);

    let mut imports = ImportSection::new();
    imports.import(hook.module, hook.name, EntityType::Function(hook_type));
    module.section(&imports);

    let mut function_section = FunctionSection::new();
    for _ in functions {
        function_section.function(entry_type);
    }
    module.section(&function_section);

    let mut exports = ExportSection::new();
    for (index, planned) in functions.iter().enumerate() {
        exports.export(
            &planned.function.name,
            ExportKind::Func,
            DEFER_HOOK + 1 + index as u32,
        );
    }
    module.section(&exports);

    let mut code = CodeSection::new();
    for planned in functions {
        code.function(&FunctionEmitter::new(planned).emit());
    }
    module.section(&code);

    module.finish()
}

struct FunctionEmitter<'a> {
    planned: &'a PlannedFunction,
    body: WasmFunction,
}

impl<'a> FunctionEmitter<'a> {
    fn new(planned: &'a PlannedFunction) -> Self {
        let slots = planned.function.cfg.len() as u32;
        FunctionEmitter {
            planned,
            body: WasmFunction::new(vec![(FIRST_SLOT - 1 + slots, ValType::I32)]),
        }
    }

    fn emit(mut self) -> WasmFunction {
        let planned = self.planned;
        let order = &planned.schedule.order;
        let count = order.len();

        self.op(Instruction::Block(BlockType::Empty));
        self.op(Instruction::Loop(BlockType::Empty));
        for _ in 0..count {
            self.op(Instruction::Block(BlockType::Empty));
        }
        let table: Vec<u32> = order
            .positions()
            .into_iter()
            .map(|position| position as u32)
            .collect();
        self.op(Instruction::LocalGet(CURRENT));
        self.op(Instruction::BrTable(table.into(), count as u32 - 1));

        for (position, block) in order.iter().enumerate() {
            self.op(Instruction::End);
            self.emit_block(position, block);
        }

        self.op(Instruction::End); // $dispatch
        self.op(Instruction::End); // $done

        self.emit_deferred_calls();
        self.op(Instruction::LocalGet(STEPS));
        self.op(Instruction::End);
        self.body
    }

    fn emit_block(&mut self, position: usize, block: BlockId) {
        let planned = self.planned;
        let info = planned.schedule.info(block);
        let slot = FIRST_SLOT + block.index() as u32;

        self.op(Instruction::LocalGet(STEPS));
        self.op(Instruction::I32Const(1));
        self.op(Instruction::I32Add);
        self.op(Instruction::LocalSet(STEPS));

        if !planned.function.defers_of(block).is_empty() {
            match info.action {
                ActionKind::Always => {}
                ActionKind::InCond => {
                    self.op(Instruction::I32Const(1));
                    self.op(Instruction::LocalSet(slot));
                }
                ActionKind::InLoop => {
                    self.op(Instruction::LocalGet(slot));
                    self.op(Instruction::I32Const(1));
                    self.op(Instruction::I32Add);
                    self.op(Instruction::LocalSet(slot));
                }
            }
        }

        // Label depth of $dispatch from the code at this position.
        let dispatch = (planned.schedule.order.len() - 1 - position) as u32;
        let successors = &planned.function.cfg.block(block).successors;
        match successors.as_slice() {
            [] => self.op(Instruction::Br(dispatch + 1)),
            [target] => self.jump(*target, info.next, dispatch),
            _ => {
                self.emit_selector(successors.len());
                for (index, target) in successors.iter().enumerate() {
                    if Some(*target) == info.next {
                        continue;
                    }
                    self.op(Instruction::LocalGet(SELECTOR));
                    self.op(Instruction::I32Const(index as i32));
                    self.op(Instruction::I32Eq);
                    self.op(Instruction::If(BlockType::Empty));
                    self.jump(*target, None, dispatch + 1);
                    self.op(Instruction::End);
                }
                if !info.next.is_some_and(|next| successors.contains(&next)) {
                    self.op(Instruction::Unreachable);
                }
            }
        }
    }

    /// Pick a successor index: the last one once fuel runs out, otherwise
    /// burn one unit of fuel and cycle through the others.
    fn emit_selector(&mut self, successors: usize) {
        let last = successors as i32 - 1;
        self.op(Instruction::LocalGet(FUEL));
        self.op(Instruction::I32Eqz);
        self.op(Instruction::If(BlockType::Result(ValType::I32)));
        self.op(Instruction::I32Const(last));
        self.op(Instruction::Else);
        self.op(Instruction::LocalGet(FUEL));
        self.op(Instruction::I32Const(1));
        self.op(Instruction::I32Sub);
        self.op(Instruction::LocalTee(FUEL));
        self.op(Instruction::I32Const(last));
        self.op(Instruction::I32RemU);
        self.op(Instruction::End);
        self.op(Instruction::LocalSet(SELECTOR));
    }

    fn jump(&mut self, target: BlockId, next: Option<BlockId>, dispatch: u32) {
        if Some(target) == next {
            return;
        }
        self.op(Instruction::I32Const(target.index() as i32));
        self.op(Instruction::LocalSet(CURRENT));
        self.op(Instruction::Br(dispatch));
    }

    /// Run deferred calls in reverse emission order, each block's calls
    /// in reverse registration order.
    fn emit_deferred_calls(&mut self) {
        let planned = self.planned;
        for &block in planned.schedule.order.blocks().iter().rev() {
            let defers = planned.function.defers_of(block);
            if defers.is_empty() {
                continue;
            }
            let slot = FIRST_SLOT + block.index() as u32;
            match planned.schedule.info(block).action {
                ActionKind::Always => self.call_defers(defers),
                ActionKind::InCond => {
                    self.op(Instruction::LocalGet(slot));
                    self.op(Instruction::If(BlockType::Empty));
                    self.call_defers(defers);
                    self.op(Instruction::End);
                }
                ActionKind::InLoop => {
                    self.op(Instruction::Block(BlockType::Empty));
                    self.op(Instruction::Loop(BlockType::Empty));
                    self.op(Instruction::LocalGet(slot));
                    self.op(Instruction::I32Eqz);
                    self.op(Instruction::BrIf(1));
                    self.call_defers(defers);
                    self.op(Instruction::LocalGet(slot));
                    self.op(Instruction::I32Const(1));
                    self.op(Instruction::I32Sub);
                    self.op(Instruction::LocalSet(slot));
                    self.op(Instruction::Br(0));
                    self.op(Instruction::End);
                    self.op(Instruction::End);
                }
            }
        }
    }

    fn call_defers(&mut self, defers: &[DeferId]) {
        for id in defers.iter().rev() {
            self.op(Instruction::I32Const(*id as i32));
            self.op(Instruction::Call(DEFER_HOOK));
        }
    }

    fn op(&mut self, instruction: Instruction<'_>) {
        self.body.instruction(&instruction);
    }
}
