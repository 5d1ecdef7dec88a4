//! Textual LLVM IR backend for scheduled functions.
//!
//! Each function becomes `define i32 @name(i32 %fuel.arg)`. Mutable
//! state (fuel, the step counter and the defer slots) lives in `alloca`s
//! so no phi nodes are needed. Blocks are written in emission order and
//! the deferred calls run from a shared `exit` block.

use crate::builtins::{BuiltinKind, builtin};
use crate::cfg::{BlockId, DeferId};
use crate::classify::ActionKind;
use crate::compiler::PlannedFunction;

/// Generate an LLVM IR module containing every planned function.
pub fn generate_llvm_ir(module_name: &str, functions: &[PlannedFunction]) -> String {
    let mut out = String::new();
    out.push_str(&format!("; ModuleID = \"{module_name}\"\n"));
    out.push_str(&format!("source_filename = \"{module_name}\"\n\n"));
    out.push_str(&builtin(BuiltinKind::DeferRun).llvm_declaration());
    out.push('\n');

    for planned in functions {
        out.push('\n');
        FunctionWriter {
            planned,
            out: &mut out,
        }
        .write();
    }
    out
}

struct FunctionWriter<'a> {
    planned: &'a PlannedFunction,
    out: &'a mut String,
}

impl FunctionWriter<'_> {
    fn write(mut self) {
        let planned = self.planned;
        self.line(format!(
            "define i32 @{}(i32 %fuel.arg) {{",
            planned.function.name
        ));
        self.write_entry();
        for (position, block) in planned.schedule.order.iter().enumerate() {
            self.write_block(position, block);
        }
        self.write_exit();
        self.line("}");
    }

    fn write_entry(&mut self) {
        let planned = self.planned;
        self.line("entry:");
        self.line("  %fuel = alloca i32");
        self.line("  %steps = alloca i32");
        self.line("  store i32 %fuel.arg, ptr %fuel");
        self.line("  store i32 0, ptr %steps");
        for block in planned.schedule.order.iter() {
            if self.needs_slot(block) {
                self.line(format!("  %slot.{block} = alloca i32"));
                self.line(format!("  store i32 0, ptr %slot.{block}"));
            }
        }
        self.line(format!("  br label %{}", BlockId::ENTRY));
    }

    fn write_block(&mut self, position: usize, block: BlockId) {
        let planned = self.planned;
        let info = planned.schedule.info(block);
        let next = match info.next {
            Some(next) => next.to_string(),
            None => "-".to_string(),
        };
        let header = format!("{block}:");
        self.line(format!(
            "\n{header:<40}; {}, position {position}, next {next}",
            info.action
        ));

        self.line(format!("  %{block}.steps = load i32, ptr %steps"));
        self.line(format!("  %{block}.steps.1 = add i32 %{block}.steps, 1"));
        self.line(format!("  store i32 %{block}.steps.1, ptr %steps"));

        let defers = planned.function.defers_of(block);
        if !defers.is_empty() {
            match info.action {
                ActionKind::Always => {
                    for id in defers {
                        self.line(format!("  ; defer {id} uses a static slot"));
                    }
                }
                ActionKind::InCond => {
                    self.line(format!("  store i32 1, ptr %slot.{block}"));
                }
                ActionKind::InLoop => {
                    self.line(format!("  %{block}.slot = load i32, ptr %slot.{block}"));
                    self.line(format!("  %{block}.slot.1 = add i32 %{block}.slot, 1"));
                    self.line(format!("  store i32 %{block}.slot.1, ptr %slot.{block}"));
                }
            }
        }

        let successors = &planned.function.cfg.block(block).successors;
        match successors.as_slice() {
            [] => self.line("  br label %exit"),
            [target] if Some(*target) == info.next => {
                self.line(format!("  br label %{target}                ; fallthrough"))
            }
            [target] => self.line(format!("  br label %{target}")),
            [first, .., last] => {
                self.line(format!("  %{block}.fuel = load i32, ptr %fuel"));
                self.line(format!("  %{block}.empty = icmp eq i32 %{block}.fuel, 0"));
                self.line(format!(
                    "  br i1 %{block}.empty, label %{last}, label %{block}.pick"
                ));
                self.line(format!("{block}.pick:"));
                self.line(format!("  %{block}.fuel.1 = sub i32 %{block}.fuel, 1"));
                self.line(format!("  store i32 %{block}.fuel.1, ptr %fuel"));
                self.line(format!(
                    "  %{block}.sel = urem i32 %{block}.fuel.1, {}",
                    successors.len() - 1
                ));
                self.line(format!("  switch i32 %{block}.sel, label %{first} ["));
                for (index, target) in successors.iter().enumerate().skip(1) {
                    self.line(format!("    i32 {index}, label %{target}"));
                }
                self.line("  ]");
            }
        }
    }

    fn write_exit(&mut self) {
        let planned = self.planned;
        self.line("\nexit:");
        for &block in planned.schedule.order.blocks().iter().rev() {
            let defers = planned.function.defers_of(block);
            if defers.is_empty() {
                continue;
            }
            let prefix = format!("exit.{block}");
            match planned.schedule.info(block).action {
                ActionKind::Always => self.call_defers(defers),
                ActionKind::InCond => {
                    self.line(format!("  %{prefix}.flag = load i32, ptr %slot.{block}"));
                    self.line(format!("  %{prefix}.set = icmp ne i32 %{prefix}.flag, 0"));
                    self.line(format!(
                        "  br i1 %{prefix}.set, label %{prefix}.run, label %{prefix}.done"
                    ));
                    self.line(format!("{prefix}.run:"));
                    self.call_defers(defers);
                    self.line(format!("  br label %{prefix}.done"));
                    self.line(format!("{prefix}.done:"));
                }
                ActionKind::InLoop => {
                    self.line(format!("  br label %{prefix}.head"));
                    self.line(format!("{prefix}.head:"));
                    self.line(format!("  %{prefix}.count = load i32, ptr %slot.{block}"));
                    self.line(format!("  %{prefix}.more = icmp ne i32 %{prefix}.count, 0"));
                    self.line(format!(
                        "  br i1 %{prefix}.more, label %{prefix}.run, label %{prefix}.done"
                    ));
                    self.line(format!("{prefix}.run:"));
                    self.call_defers(defers);
                    self.line(format!("  %{prefix}.count.1 = sub i32 %{prefix}.count, 1"));
                    self.line(format!("  store i32 %{prefix}.count.1, ptr %slot.{block}"));
                    self.line(format!("  br label %{prefix}.head"));
                    self.line(format!("{prefix}.done:"));
                }
            }
        }
        self.line("  %result = load i32, ptr %steps");
        self.line("  ret i32 %result");
    }

    fn call_defers(&mut self, defers: &[DeferId]) {
        let hook = builtin(BuiltinKind::DeferRun).name;
        for id in defers.iter().rev() {
            self.line(format!("  call void @{hook}(i32 {id})"));
        }
    }

    /// Always blocks register into static slots and need no storage.
    fn needs_slot(&self, block: BlockId) -> bool {
        !self.planned.function.defers_of(block).is_empty()
            && self.planned.schedule.info(block).action != ActionKind::Always
    }

    fn line(&mut self, text: impl AsRef<str>) {
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, plan_source};

    fn ir_for(source: &str) -> String {
        let planned = plan_source(source, &CompileOptions::default()).expect("plan");
        generate_llvm_ir("test", &planned)
    }

    #[test]
    fn declares_hook_and_defines_functions() {
        let ir = ir_for("fn a { bb0: return } fn b { bb0: return }");
        assert!(ir.starts_with("; ModuleID = \"test\"\n"));
        assert!(ir.contains("declare void @defer_run(i32)"));
        assert!(ir.contains("define i32 @a(i32 %fuel.arg) {"));
        assert!(ir.contains("define i32 @b(i32 %fuel.arg) {"));
        assert_eq!(ir.matches("ret i32 %result").count(), 2);
    }

    #[test]
    fn guards_follow_defer_policy() {
        let ir = ir_for(
            "fn f {
                bb0: defer 1 jump bb1
                bb1: defer 2 jump bb2
                bb2: jump bb1, bb3
                bb3: defer 3 return
            }",
        );
        // bb1 sits in the loop and needs a counter; bb0 and bb3 are static.
        assert!(ir.contains("%slot.bb1 = alloca i32"));
        assert!(!ir.contains("%slot.bb0"));
        assert!(!ir.contains("%slot.bb3"));
        assert!(ir.contains("exit.bb1.head:"));
        assert!(ir.contains("; defer 1 uses a static slot"));

        // Defers run in reverse emission order.
        let third = ir.find("call void @defer_run(i32 3)").expect("defer 3");
        let second = ir.find("call void @defer_run(i32 2)").expect("defer 2");
        let first = ir.find("call void @defer_run(i32 1)").expect("defer 1");
        assert!(third < second && second < first);
    }

    #[test]
    fn conditional_defers_use_flags() {
        let ir = ir_for(
            "fn f {
                bb0: jump bb1, bb2
                bb1: defer 5 return
                bb2: return
            }",
        );
        assert!(ir.contains("store i32 1, ptr %slot.bb1"));
        assert!(ir.contains("%exit.bb1.set = icmp ne i32 %exit.bb1.flag, 0"));
    }

    #[test]
    fn marks_fallthrough_edges() {
        let ir = ir_for("fn f { bb0: jump bb1 bb1: return bb2: jump bb1 }");
        // Order is [bb0, bb2, bb1]: bb2 falls through into bb1, bb0 does not.
        assert!(ir.contains("br label %bb1                ; fallthrough"));
        assert_eq!(ir.matches("; fallthrough").count(), 1);
        let bb2 = ir.find("\nbb2:").expect("bb2 label");
        let bb1 = ir.find("\nbb1:").expect("bb1 label");
        assert!(bb2 < bb1);
    }

    #[test]
    fn multiway_branch_uses_switch() {
        let ir = ir_for("fn f { bb0: jump bb1, bb2, bb3 bb1: return bb2: return bb3: return }");
        assert!(ir.contains("br i1 %bb0.empty, label %bb3, label %bb0.pick"));
        assert!(ir.contains("%bb0.sel = urem i32 %bb0.fuel.1, 2"));
        assert!(ir.contains("switch i32 %bb0.sel, label %bb1 ["));
        assert!(ir.contains("    i32 1, label %bb2"));
        assert!(ir.contains("    i32 2, label %bb3"));
    }
}
