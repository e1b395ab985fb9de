//! Core virtual machine implementation.
//!
//! A [`VM`] owns a fixed-size memory region, a bounded operand stack of
//! 64-bit words, a bounded call stack and a private copy of the loaded
//! bytecode. Words are unsigned: arithmetic wraps modulo 2^64, DIV truncates
//! and GT/LT compare unsigned.
//!
//! Execution is synchronous and single-threaded. A VM is `Send`, so a host
//! that needs a deadline runs it on a thread it can abandon, or drives it
//! with [`VM::step`] and stops after its own instruction budget.

mod call_stack;
mod memory;
mod stack;

use crate::virtual_machine::config::VmConfig;
use crate::virtual_machine::disasm::{DecodedInstruction, decode_at};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, OPERAND_SIZE};
use crate::virtual_machine::output::{Output, StdoutOutput};
use crate::{debug, warn};
use call_stack::CallStack;
use memory::Memory;
use stack::OperandStack;

/// Size in bytes of a stack word in memory.
pub const WORD_SIZE: usize = 8;

/// Fault raised by a handler, before the faulting offset is attached.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Trap {
    StackOverflow { capacity: usize },
    StackUnderflow { needed: usize, available: usize },
    CallStackOverflow { max_depth: usize },
    CallStackUnderflow,
    DivideByZero,
    MemoryOutOfRange { address: u64, mem_size: usize },
    JumpOutOfRange { target: u64, bytecode_size: usize },
    TruncatedBytecode { requested: usize, available: usize },
    UnknownOpcode { opcode: u8 },
}

impl Trap {
    /// Converts into the public error, located at opcode offset `ip`.
    fn at(self, ip: usize) -> VMError {
        match self {
            Trap::StackOverflow { capacity } => VMError::StackOverflow { ip, capacity },
            Trap::StackUnderflow { needed, available } => VMError::StackUnderflow {
                ip,
                needed,
                available,
            },
            Trap::CallStackOverflow { max_depth } => VMError::CallStackOverflow { ip, max_depth },
            Trap::CallStackUnderflow => VMError::CallStackUnderflow { ip },
            Trap::DivideByZero => VMError::DivideByZero { ip },
            Trap::MemoryOutOfRange { address, mem_size } => VMError::MemoryOutOfRange {
                ip,
                address,
                mem_size,
            },
            Trap::JumpOutOfRange {
                target,
                bytecode_size,
            } => VMError::JumpOutOfRange {
                ip,
                target,
                bytecode_size,
            },
            Trap::TruncatedBytecode {
                requested,
                available,
            } => VMError::TruncatedBytecode {
                ip,
                requested,
                available,
            },
            Trap::UnknownOpcode { opcode } => VMError::UnknownOpcode { ip, opcode },
        }
    }
}

/// What the interpreter loop does after a handler returns.
enum Flow {
    Continue,
    Halt,
}

/// Outcome of a single [`VM::step`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    /// An instruction ran and more bytecode follows.
    Running,
    /// END was executed.
    Halted,
    /// The instruction pointer reached the end of the bytecode.
    EndOfProgram,
}

impl Status {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Status::Running)
    }
}

macro_rules! exec_vm {
    // Entry point
    (
        machine = $m:ident,
        out = $out:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => {
                    exec_vm!(@call $m, $out, Instruction::$variant, $handler, $args)
                }
            ),*
        }
    }};

    // Handler that talks to the host output (semicolon separator)
    (@call $m:ident, $out:ident, $instr:expr, $handler:ident,
        (out; $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $m, $kind)?; )*
        $m.stack.require($instr.stack_inputs())?;
        $m.$handler($out, $( $field ),*)
    }};

    // Handler operating on machine state only
    (@call $m:ident, $out:ident, $instr:expr, $handler:ident,
        ( $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $m, $kind)?; )*
        $m.stack.require($instr.stack_inputs())?;
        $m.$handler($( $field ),*)
    }};

    // Every operand kind is an 8-byte little-endian word
    (@read $m:ident, Imm) => {{ $m.read_operand() }};
    (@read $m:ident, Addr) => {{ $m.read_operand() }};
    (@read $m:ident, Target) => {{ $m.read_operand() }};
}

/// Buffers owned by a live VM instance.
struct Machine {
    memory: Memory,
    stack: OperandStack,
    call_stack: CallStack,
    /// Private copy of the program; `None` until the first load.
    bytecode: Option<Box<[u8]>>,
    /// Offset of the next opcode to fetch.
    ip: usize,
    /// Instructions completed since the last load.
    executed: u64,
}

impl Machine {
    /// Acquires every buffer. A failure drops whatever was already acquired.
    fn allocate(config: &VmConfig) -> Result<Self, VMError> {
        let memory = Memory::allocate(config.mem_size as usize)?;
        let stack = OperandStack::allocate(config.stack_size as usize)?;
        let call_stack = CallStack::allocate(config.max_call_depth as usize)?;
        Ok(Self {
            memory,
            stack,
            call_stack,
            bytecode: None,
            ip: 0,
            executed: 0,
        })
    }

    fn code(&self) -> &[u8] {
        self.bytecode.as_deref().unwrap_or_default()
    }

    /// Reads the 8-byte operand at `ip` and advances past it.
    fn read_operand(&mut self) -> Result<u64, Trap> {
        let code = self.code();
        let start = self.ip;
        let bytes = start
            .checked_add(OPERAND_SIZE)
            .and_then(|end| code.get(start..end))
            .ok_or(Trap::TruncatedBytecode {
                requested: OPERAND_SIZE,
                available: code.len().saturating_sub(start),
            })?;
        let mut word = [0u8; OPERAND_SIZE];
        word.copy_from_slice(bytes);
        self.ip = start + OPERAND_SIZE;
        Ok(u64::from_le_bytes(word))
    }

    /// Validates an absolute jump or call target.
    fn jump_target(&self, target: u64) -> Result<usize, Trap> {
        let bytecode_size = self.code().len();
        usize::try_from(target)
            .ok()
            .filter(|t| *t < bytecode_size)
            .ok_or(Trap::JumpOutOfRange {
                target,
                bytecode_size,
            })
    }

    /// Fetches, decodes and executes one instruction.
    ///
    /// On a trap the instruction pointer is left at the faulting opcode.
    fn step<O: Output + ?Sized>(&mut self, out: &mut O) -> Result<Status, VMError> {
        let Some(code) = self.bytecode.as_deref() else {
            return Err(VMError::NotInitialized);
        };
        let opcode_offset = self.ip;
        let Some(&opcode) = code.get(opcode_offset) else {
            return Ok(Status::EndOfProgram);
        };
        self.ip += 1;

        let result = Instruction::try_from(opcode)
            .map_err(|_| Trap::UnknownOpcode { opcode })
            .and_then(|instr| self.exec(instr, out));

        match result {
            Ok(flow) => {
                self.executed += 1;
                match flow {
                    Flow::Halt => Ok(Status::Halted),
                    Flow::Continue if self.ip >= self.code().len() => Ok(Status::EndOfProgram),
                    Flow::Continue => Ok(Status::Running),
                }
            }
            Err(trap) => {
                self.ip = opcode_offset;
                Err(trap.at(opcode_offset))
            }
        }
    }

    /// Executes a single decoded instruction.
    fn exec<O: Output + ?Sized>(&mut self, instruction: Instruction, out: &mut O) -> Result<Flow, Trap> {
        exec_vm! {
            machine = self,
            out = out,
            instr = instruction,
            {
                // Stack
                Push => op_push(value: Imm),
                Pop => op_pop(),
                // Arithmetic
                Add => op_add(),
                Sub => op_sub(),
                Mul => op_mul(),
                Div => op_div(),
                // Memory
                Store => op_store(address: Addr),
                Load => op_load(address: Addr),
                Print => op_print(out;),
                // Control flow
                Call => op_call(target: Target),
                Ret => op_ret(),
                Jmp => op_jmp(target: Target),
                JmpIf => op_jmp_if(target: Target),
                // Comparison
                Eq => op_eq(),
                Gt => op_gt(),
                Lt => op_lt(),
                End => op_end(),
            }
        }
    }

    fn op_push(&mut self, value: u64) -> Result<Flow, Trap> {
        self.stack.push(value)?;
        Ok(Flow::Continue)
    }

    fn op_pop(&mut self) -> Result<Flow, Trap> {
        self.stack.pop()?;
        Ok(Flow::Continue)
    }

    fn op_add(&mut self) -> Result<Flow, Trap> {
        self.stack.binary(|a, b| Ok(a.wrapping_add(b)))?;
        Ok(Flow::Continue)
    }

    fn op_sub(&mut self) -> Result<Flow, Trap> {
        self.stack.binary(|a, b| Ok(a.wrapping_sub(b)))?;
        Ok(Flow::Continue)
    }

    fn op_mul(&mut self) -> Result<Flow, Trap> {
        self.stack.binary(|a, b| Ok(a.wrapping_mul(b)))?;
        Ok(Flow::Continue)
    }

    fn op_div(&mut self) -> Result<Flow, Trap> {
        self.stack
            .binary(|a, b| a.checked_div(b).ok_or(Trap::DivideByZero))?;
        Ok(Flow::Continue)
    }

    fn op_store(&mut self, address: u64) -> Result<Flow, Trap> {
        let value = self.stack.peek()?;
        self.memory.write_word(address, value)?;
        self.stack.pop()?;
        Ok(Flow::Continue)
    }

    fn op_load(&mut self, address: u64) -> Result<Flow, Trap> {
        let value = self.memory.read_word(address)?;
        self.stack.push(value)?;
        Ok(Flow::Continue)
    }

    fn op_print<O: Output + ?Sized>(&mut self, out: &mut O) -> Result<Flow, Trap> {
        out.print(self.stack.peek()?);
        Ok(Flow::Continue)
    }

    fn op_call(&mut self, target: u64) -> Result<Flow, Trap> {
        let target = self.jump_target(target)?;
        self.call_stack.push(self.ip)?;
        self.ip = target;
        Ok(Flow::Continue)
    }

    fn op_ret(&mut self) -> Result<Flow, Trap> {
        self.ip = self.call_stack.pop()?;
        Ok(Flow::Continue)
    }

    fn op_jmp(&mut self, target: u64) -> Result<Flow, Trap> {
        self.ip = self.jump_target(target)?;
        Ok(Flow::Continue)
    }

    fn op_jmp_if(&mut self, target: u64) -> Result<Flow, Trap> {
        // Target is only validated when the branch is taken.
        if self.stack.peek()? != 0 {
            let target = self.jump_target(target)?;
            self.stack.pop()?;
            self.ip = target;
        } else {
            self.stack.pop()?;
        }
        Ok(Flow::Continue)
    }

    fn op_eq(&mut self) -> Result<Flow, Trap> {
        self.stack.binary(|a, b| Ok((a == b) as u64))?;
        Ok(Flow::Continue)
    }

    fn op_gt(&mut self) -> Result<Flow, Trap> {
        self.stack.binary(|a, b| Ok((a > b) as u64))?;
        Ok(Flow::Continue)
    }

    fn op_lt(&mut self) -> Result<Flow, Trap> {
        self.stack.binary(|a, b| Ok((a < b) as u64))?;
        Ok(Flow::Continue)
    }

    fn op_end(&mut self) -> Result<Flow, Trap> {
        Ok(Flow::Halt)
    }
}

/// Caller-owned VM instance.
///
/// Any number of instances may coexist; none share state. A destroyed
/// instance keeps its configuration and can be re-armed with
/// [`VM::initialize`].
pub struct VM {
    config: VmConfig,
    machine: Option<Machine>,
}

impl VM {
    /// Creates an instance with zeroed memory, an empty stack and no bytecode.
    pub fn create(config: VmConfig) -> Result<Self, VMError> {
        config.validate()?;
        let machine = Machine::allocate(&config)?;
        debug!(
            "vm created: memory={}B stack={} words call depth={}",
            config.mem_size, config.stack_size, config.max_call_depth
        );
        Ok(Self {
            config,
            machine: Some(machine),
        })
    }

    /// Re-acquires buffers for a destroyed instance.
    ///
    /// Fails with [`VMError::AlreadyInitialized`] while the instance is live.
    pub fn initialize(&mut self, config: VmConfig) -> Result<(), VMError> {
        if self.machine.is_some() {
            return Err(VMError::AlreadyInitialized);
        }
        config.validate()?;
        self.machine = Some(Machine::allocate(&config)?);
        self.config = config;
        Ok(())
    }

    /// Releases every buffer. Destroying twice is a no-op.
    pub fn destroy(&mut self) {
        if self.machine.take().is_some() {
            debug!("vm destroyed");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.machine.is_some()
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    fn machine(&self) -> Result<&Machine, VMError> {
        self.machine.as_ref().ok_or(VMError::NotInitialized)
    }

    fn machine_mut(&mut self) -> Result<&mut Machine, VMError> {
        self.machine.as_mut().ok_or(VMError::NotInitialized)
    }

    /// Installs a copy of `bytecode`, resetting `ip` and the call stack.
    ///
    /// Memory and the operand stack are kept. When the copy cannot be
    /// allocated the previous program stays installed.
    pub fn load(&mut self, bytecode: &[u8]) -> Result<(), VMError> {
        let machine = self.machine_mut()?;

        let mut copy = Vec::new();
        copy.try_reserve_exact(bytecode.len())
            .map_err(|_| VMError::AllocationFailure {
                buffer: "bytecode",
                bytes: bytecode.len(),
            })?;
        copy.extend_from_slice(bytecode);

        machine.bytecode = Some(copy.into_boxed_slice());
        machine.ip = 0;
        machine.executed = 0;
        machine.call_stack.clear();
        debug!("loaded {} bytes of bytecode", bytecode.len());
        Ok(())
    }

    /// Runs from the current `ip` until END, the end of the bytecode, or a trap.
    /// PRINT writes to stdout.
    pub fn execute(&mut self) -> Result<(), VMError> {
        self.execute_with(&mut StdoutOutput)
    }

    /// Like [`execute`](Self::execute), sending PRINT values to `out`.
    pub fn execute_with<O: Output + ?Sized>(&mut self, out: &mut O) -> Result<(), VMError> {
        let machine = self.machine_mut()?;
        loop {
            match machine.step(out) {
                Ok(Status::Running) => {}
                Ok(_) => return Ok(()),
                Err(err) => {
                    warn!("execution trapped: {err}");
                    return Err(err);
                }
            }
        }
    }

    /// Executes exactly one instruction.
    pub fn step<O: Output + ?Sized>(&mut self, out: &mut O) -> Result<Status, VMError> {
        self.machine_mut()?.step(out)
    }

    /// Returns the top of the operand stack without popping it.
    pub fn peek_top(&self) -> Result<u64, VMError> {
        let machine = self.machine()?;
        machine.stack.peek().map_err(|trap| trap.at(machine.ip))
    }

    /// Decodes the instruction at `ip`, if there is one.
    pub fn current_instruction(&self) -> Option<DecodedInstruction> {
        let machine = self.machine.as_ref()?;
        decode_at(machine.bytecode.as_deref()?, machine.ip).ok()
    }

    /// Offset of the next opcode; 0 when destroyed.
    pub fn ip(&self) -> usize {
        self.machine.as_ref().map_or(0, |m| m.ip)
    }

    /// Live stack words, bottom first; empty when destroyed.
    pub fn stack(&self) -> &[u64] {
        self.machine
            .as_ref()
            .map(|m| m.stack.as_slice())
            .unwrap_or_default()
    }

    /// Number of live stack words.
    pub fn stack_depth(&self) -> usize {
        self.stack().len()
    }

    pub fn stack_capacity(&self) -> usize {
        self.machine.as_ref().map_or(0, |m| m.stack.capacity())
    }

    /// The memory region; empty when destroyed.
    pub fn memory(&self) -> &[u8] {
        self.machine
            .as_ref()
            .map(|m| m.memory.as_slice())
            .unwrap_or_default()
    }

    pub fn memory_size(&self) -> usize {
        self.machine.as_ref().map_or(0, |m| m.memory.len())
    }

    /// Number of pending CALL return addresses.
    pub fn call_depth(&self) -> usize {
        self.machine.as_ref().map_or(0, |m| m.call_stack.depth())
    }

    /// Size of the installed bytecode; 0 when nothing is loaded.
    pub fn bytecode_size(&self) -> usize {
        self.machine.as_ref().map_or(0, |m| m.code().len())
    }

    /// Instructions completed since the last load.
    pub fn instructions_executed(&self) -> u64 {
        self.machine.as_ref().map_or(0, |m| m.executed)
    }
}

impl std::fmt::Debug for VM {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VM")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .field("ip", &self.ip())
            .field("stack", &self.stack())
            .field("call_depth", &self.call_depth())
            .finish()
    }
}
