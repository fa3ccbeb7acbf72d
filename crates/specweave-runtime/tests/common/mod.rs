//! Shared bank fixtures for runtime tests
//!
//! `bank/Account` carries the marker and a companion whose specifications
//! require non-negative amounts (and `amount <= balance` for withdrawals)
//! and ensure the balance moves by exactly `amount`. `bank/QEAccount`
//! relaxes the withdrawal precondition and leaves the balance alone when
//! funds are short. `bank/BuggyAccount` breaks every postcondition it
//! declares, and `app/Client` calls through statically typed references.

#![allow(dead_code)]

use specweave_bytecode::{access, ClassBuilder, ClassFile, CodeBuilder, Cond, Instruction, Kind};
use specweave_engine::{MemorySource, Weaver};
use specweave_runtime::{Value, Vm, VmError};
use std::sync::Arc;

pub const MARKER: &str = "contracts/Contracted";
pub const CONTRACTS: &str = "contracts/Contracts";
pub const ENSURES_CHECK: &str = "(Lcontracts/Predicate;)Lcontracts/DeferredCheck;";
pub const ENSURES_RUNNABLE: &str = "(Lcontracts/Condition;)Lcontracts/DeferredRunnable;";

// ===== Helpers =====

/// Consume two ints and call `requires`; `fails` is the comparison that
/// violates the precondition
fn requires_unless(code: &mut CodeBuilder, fails: Cond) {
    let fail = code.new_label();
    let done = code.new_label();
    code.if_cmp(fails, fail).iconst(1).goto(done);
    code.bind(fail).iconst(0);
    code.bind(done).invoke_static(CONTRACTS, "requires", "(Z)V");
}

fn balance_of(code: &mut CodeBuilder, slot: u16) {
    code.load(Kind::Ref, slot)
        .invoke_virtual("bank/Account", "getBalance", "()I");
}

fn super_init(code: &mut CodeBuilder, superclass: &str) {
    code.load(Kind::Ref, 0).invoke_special(superclass, "<init>", "()V");
}

// ===== Contract-bearing classes =====

pub fn account() -> ClassFile {
    ClassBuilder::new("bank/Account")
        .annotate(MARKER)
        .field(access::PRIVATE, "balance", "I")
        .method(access::PUBLIC, "<init>", "(I)V", |code| {
            super_init(code, "lang/Object");
            code.load(Kind::Ref, 0)
                .load(Kind::Int, 1)
                .putfield("bank/Account", "balance", "I")
                .ret_void();
        })
        .method(access::PUBLIC, "withdraw", "(I)Z", |code| {
            let refuse = code.new_label();
            code.load(Kind::Ref, 0)
                .getfield("bank/Account", "balance", "I")
                .load(Kind::Int, 1)
                .if_cmp(Cond::Lt, refuse)
                .load(Kind::Ref, 0)
                .load(Kind::Ref, 0)
                .getfield("bank/Account", "balance", "I")
                .load(Kind::Int, 1)
                .emit(Instruction::Sub(Kind::Int))
                .putfield("bank/Account", "balance", "I")
                .iconst(1)
                .ret(Kind::Int);
            code.bind(refuse).iconst(0).ret(Kind::Int);
        })
        .method(access::PUBLIC, "deposit", "(I)V", |code| {
            code.load(Kind::Ref, 0)
                .load(Kind::Ref, 0)
                .getfield("bank/Account", "balance", "I")
                .load(Kind::Int, 1)
                .emit(Instruction::Add(Kind::Int))
                .putfield("bank/Account", "balance", "I")
                .ret_void();
        })
        .method(access::PUBLIC, "getBalance", "()I", |code| {
            code.load(Kind::Ref, 0)
                .getfield("bank/Account", "balance", "I")
                .ret(Kind::Int);
        })
        .build()
        .unwrap()
}

fn withdraw_spec(builder: ClassBuilder, receiver: &str) -> ClassBuilder {
    let desc = format!("(L{};I)Lcontracts/DeferredCheck;", receiver);
    builder.method(access::PUBLIC | access::STATIC, "withdrawSpec", &desc, |code| {
        // 0 <= amount <= balance
        code.load(Kind::Int, 1).iconst(0);
        requires_unless(code, Cond::Lt);
        code.load(Kind::Int, 1);
        balance_of(code, 0);
        requires_unless(code, Cond::Gt);
        code.new_object("bank/Withdrawn")
            .emit(Instruction::Dup)
            .load(Kind::Ref, 0);
        balance_of(code, 0);
        code.load(Kind::Int, 1)
            .emit(Instruction::Sub(Kind::Int))
            .invoke_special("bank/Withdrawn", "<init>", "(Lbank/Account;I)V")
            .invoke_static(CONTRACTS, "ensures", ENSURES_CHECK)
            .ret(Kind::Ref);
    })
}

fn deposit_spec(builder: ClassBuilder, receiver: &str) -> ClassBuilder {
    let desc = format!("(L{};I)Lcontracts/DeferredRunnable;", receiver);
    builder.method(access::PUBLIC | access::STATIC, "depositSpec", &desc, |code| {
        code.load(Kind::Int, 1).iconst(0);
        requires_unless(code, Cond::Lt);
        code.new_object("bank/BalanceEquals")
            .emit(Instruction::Dup)
            .load(Kind::Ref, 0);
        balance_of(code, 0);
        code.load(Kind::Int, 1)
            .emit(Instruction::Add(Kind::Int))
            .invoke_special("bank/BalanceEquals", "<init>", "(Lbank/Account;I)V")
            .invoke_static(CONTRACTS, "ensures", ENSURES_RUNNABLE)
            .ret(Kind::Ref);
    })
}

/// Requires a non-negative opening balance and ensures it is kept
fn constructor_spec(builder: ClassBuilder) -> ClassBuilder {
    let flags = access::PUBLIC | access::STATIC;
    builder.method(flags, "constructorSpec", "(I)Lcontracts/DeferredCheck;", |code| {
        code.load(Kind::Int, 0).iconst(0);
        requires_unless(code, Cond::Lt);
        code.new_object("bank/NewBalance")
            .emit(Instruction::Dup)
            .load(Kind::Int, 0)
            .invoke_special("bank/NewBalance", "<init>", "(I)V")
            .invoke_static(CONTRACTS, "ensures", ENSURES_CHECK)
            .ret(Kind::Ref);
    })
}

pub fn account_spec() -> ClassFile {
    let builder = constructor_spec(ClassBuilder::new("bank/AccountSpec"));
    let builder = withdraw_spec(builder, "bank/Account");
    deposit_spec(builder, "bank/Account").build().unwrap()
}

/// Opens empty and withdraws only what it holds, reporting success either way
pub fn qe_account() -> ClassFile {
    ClassBuilder::new("bank/QEAccount")
        .extends("bank/Account")
        .annotate(MARKER)
        .method(access::PUBLIC, "<init>", "()V", |code| {
            code.load(Kind::Ref, 0)
                .iconst(0)
                .invoke_special("bank/Account", "<init>", "(I)V")
                .ret_void();
        })
        .method(access::PUBLIC, "withdraw", "(I)Z", |code| {
            let short = code.new_label();
            balance_of(code, 0);
            code.load(Kind::Int, 1)
                .if_cmp(Cond::Lt, short)
                .load(Kind::Ref, 0)
                .load(Kind::Int, 1)
                .invoke_special("bank/Account", "withdraw", "(I)Z")
                .emit(Instruction::Pop);
            code.bind(short).iconst(1).ret(Kind::Int);
        })
        .build()
        .unwrap()
}

/// Any non-negative amount is accepted; the balance drops by `amount`
/// when it covers it and stays put otherwise
pub fn qe_account_spec() -> ClassFile {
    let flags = access::PUBLIC | access::STATIC;
    ClassBuilder::new("bank/QEAccountSpec")
        .method(flags, "constructorSpec", "()Lcontracts/DeferredCheck;", |code| {
            code.iconst(1)
                .invoke_static(CONTRACTS, "requires", "(Z)V")
                .new_object("bank/NewBalance")
                .emit(Instruction::Dup)
                .iconst(0)
                .invoke_special("bank/NewBalance", "<init>", "(I)V")
                .invoke_static(CONTRACTS, "ensures", ENSURES_CHECK)
                .ret(Kind::Ref);
        })
        .method(flags, "withdrawSpec", "(Lbank/QEAccount;I)Lcontracts/DeferredCheck;", |code| {
            code.load(Kind::Int, 1).iconst(0);
            requires_unless(code, Cond::Lt);
            let short = code.new_label();
            let expected = code.new_label();
            code.new_object("bank/Withdrawn")
                .emit(Instruction::Dup)
                .load(Kind::Ref, 0);
            balance_of(code, 0);
            code.load(Kind::Int, 1).if_cmp(Cond::Lt, short);
            balance_of(code, 0);
            code.load(Kind::Int, 1)
                .emit(Instruction::Sub(Kind::Int))
                .goto(expected);
            code.bind(short);
            balance_of(code, 0);
            code.bind(expected)
                .invoke_special("bank/Withdrawn", "<init>", "(Lbank/Account;I)V")
                .invoke_static(CONTRACTS, "ensures", ENSURES_CHECK)
                .ret(Kind::Ref);
        })
        .build()
        .unwrap()
}

/// Halves the opening balance, subtracts on deposit and adds 10 on withdrawal
pub fn buggy_account() -> ClassFile {
    ClassBuilder::new("bank/BuggyAccount")
        .extends("bank/Account")
        .annotate(MARKER)
        .method(access::PUBLIC, "<init>", "(I)V", |code| {
            code.load(Kind::Ref, 0)
                .load(Kind::Int, 1)
                .invoke_special("bank/Account", "<init>", "(I)V")
                .load(Kind::Ref, 0)
                .load(Kind::Int, 1)
                .iconst(2)
                .emit(Instruction::Div(Kind::Int))
                .putfield("bank/Account", "balance", "I")
                .ret_void();
        })
        .method(access::PUBLIC, "deposit", "(I)V", |code| {
            code.load(Kind::Ref, 0)
                .load(Kind::Ref, 0)
                .getfield("bank/Account", "balance", "I")
                .load(Kind::Int, 1)
                .emit(Instruction::Sub(Kind::Int))
                .putfield("bank/Account", "balance", "I")
                .ret_void();
        })
        .method(access::PUBLIC, "withdraw", "(I)Z", |code| {
            code.load(Kind::Ref, 0)
                .load(Kind::Ref, 0)
                .getfield("bank/Account", "balance", "I")
                .iconst(10)
                .emit(Instruction::Add(Kind::Int))
                .putfield("bank/Account", "balance", "I")
                .iconst(1)
                .ret(Kind::Int);
        })
        .build()
        .unwrap()
}

pub fn buggy_account_spec() -> ClassFile {
    let builder = constructor_spec(ClassBuilder::new("bank/BuggyAccountSpec"));
    let builder = withdraw_spec(builder, "bank/BuggyAccount");
    deposit_spec(builder, "bank/BuggyAccount").build().unwrap()
}

// ===== Predicates =====

/// `account.getBalance() == expected`, usable as predicate or condition
pub fn balance_equals() -> ClassFile {
    ClassBuilder::new("bank/BalanceEquals")
        .implements("contracts/Predicate")
        .implements("contracts/Condition")
        .field(access::PRIVATE, "account", "Lbank/Account;")
        .field(access::PRIVATE, "expected", "I")
        .method(access::PUBLIC, "<init>", "(Lbank/Account;I)V", |code| {
            super_init(code, "lang/Object");
            code.load(Kind::Ref, 0)
                .load(Kind::Ref, 1)
                .putfield("bank/BalanceEquals", "account", "Lbank/Account;")
                .load(Kind::Ref, 0)
                .load(Kind::Int, 2)
                .putfield("bank/BalanceEquals", "expected", "I")
                .ret_void();
        })
        .method(access::PUBLIC, "holds", "()Z", |code| {
            let differs = code.new_label();
            code.load(Kind::Ref, 0)
                .getfield("bank/BalanceEquals", "account", "Lbank/Account;")
                .invoke_virtual("bank/Account", "getBalance", "()I")
                .load(Kind::Ref, 0)
                .getfield("bank/BalanceEquals", "expected", "I")
                .if_cmp(Cond::Ne, differs)
                .iconst(1)
                .ret(Kind::Int);
            code.bind(differs).iconst(0).ret(Kind::Int);
        })
        .method(access::PUBLIC, "test", "(Llang/Object;)Z", |code| {
            code.load(Kind::Ref, 0)
                .invoke_virtual("bank/BalanceEquals", "holds", "()Z")
                .ret(Kind::Int);
        })
        .build()
        .unwrap()
}

/// The withdrawal reported success and moved the balance to `expected`
pub fn withdrawn() -> ClassFile {
    ClassBuilder::new("bank/Withdrawn")
        .extends("bank/BalanceEquals")
        .method(access::PUBLIC, "<init>", "(Lbank/Account;I)V", |code| {
            code.load(Kind::Ref, 0)
                .load(Kind::Ref, 1)
                .load(Kind::Int, 2)
                .invoke_special("bank/BalanceEquals", "<init>", "(Lbank/Account;I)V")
                .ret_void();
        })
        .method(access::PUBLIC, "test", "(Llang/Object;)Z", |code| {
            let refused = code.new_label();
            code.load(Kind::Ref, 1)
                .emit(Instruction::CheckCast("lang/Boolean".to_string()))
                .invoke_virtual("lang/Boolean", "booleanValue", "()Z")
                .if_zero(Cond::Eq, refused)
                .load(Kind::Ref, 0)
                .invoke_virtual("bank/BalanceEquals", "holds", "()Z")
                .ret(Kind::Int);
            code.bind(refused).iconst(0).ret(Kind::Int);
        })
        .build()
        .unwrap()
}

/// The constructed account holds `expected`
pub fn new_balance() -> ClassFile {
    ClassBuilder::new("bank/NewBalance")
        .implements("contracts/Predicate")
        .field(access::PRIVATE, "expected", "I")
        .method(access::PUBLIC, "<init>", "(I)V", |code| {
            super_init(code, "lang/Object");
            code.load(Kind::Ref, 0)
                .load(Kind::Int, 1)
                .putfield("bank/NewBalance", "expected", "I")
                .ret_void();
        })
        .method(access::PUBLIC, "test", "(Llang/Object;)Z", |code| {
            let differs = code.new_label();
            code.load(Kind::Ref, 1)
                .emit(Instruction::CheckCast("bank/Account".to_string()))
                .invoke_virtual("bank/Account", "getBalance", "()I")
                .load(Kind::Ref, 0)
                .getfield("bank/NewBalance", "expected", "I")
                .if_cmp(Cond::Ne, differs)
                .iconst(1)
                .ret(Kind::Int);
            code.bind(differs).iconst(0).ret(Kind::Int);
        })
        .build()
        .unwrap()
}

// ===== Client =====

/// Static helpers whose call sites are typed `Account` or `QEAccount`
pub fn client() -> ClassFile {
    let flags = access::PUBLIC | access::STATIC;
    ClassBuilder::new("app/Client")
        .method(flags, "open", "(I)Lbank/Account;", |code| {
            code.new_object("bank/Account")
                .emit(Instruction::Dup)
                .load(Kind::Int, 0)
                .invoke_special("bank/Account", "<init>", "(I)V")
                .ret(Kind::Ref);
        })
        .method(flags, "deposit", "(Lbank/Account;I)V", |code| {
            code.load(Kind::Ref, 0)
                .load(Kind::Int, 1)
                .invoke_virtual("bank/Account", "deposit", "(I)V")
                .ret_void();
        })
        .method(flags, "withdraw", "(Lbank/Account;I)Z", |code| {
            code.load(Kind::Ref, 0)
                .load(Kind::Int, 1)
                .invoke_virtual("bank/Account", "withdraw", "(I)Z")
                .ret(Kind::Int);
        })
        .method(flags, "depositQE", "(Lbank/QEAccount;I)V", |code| {
            code.load(Kind::Ref, 0)
                .load(Kind::Int, 1)
                .invoke_virtual("bank/QEAccount", "deposit", "(I)V")
                .ret_void();
        })
        .method(flags, "withdrawQE", "(Lbank/QEAccount;I)Z", |code| {
            code.load(Kind::Ref, 0)
                .load(Kind::Int, 1)
                .invoke_virtual("bank/QEAccount", "withdraw", "(I)Z")
                .ret(Kind::Int);
        })
        // Throws for a zero amount; catches anything thrown as -1
        .method(flags, "guardedWithdraw", "(Lbank/Account;I)I", |code| {
            let start = code.new_label();
            let call = code.new_label();
            let end = code.new_label();
            let handler = code.new_label();
            code.bind(start)
                .load(Kind::Int, 1)
                .if_zero(Cond::Ne, call)
                .new_object("lang/Throwable")
                .emit(Instruction::Dup)
                .invoke_special("lang/Throwable", "<init>", "()V")
                .throw();
            code.bind(call)
                .load(Kind::Ref, 0)
                .load(Kind::Int, 1)
                .invoke_virtual("bank/Account", "withdraw", "(I)Z");
            code.bind(end).ret(Kind::Int);
            code.bind(handler)
                .emit(Instruction::Pop)
                .iconst(-1)
                .ret(Kind::Int);
            code.try_catch(start, end, handler, Some("lang/Throwable"));
        })
        .build()
        .unwrap()
}

// ===== VM setup =====

pub fn bank() -> MemorySource {
    let source = MemorySource::new();
    for class in [
        account(),
        account_spec(),
        qe_account(),
        qe_account_spec(),
        buggy_account(),
        buggy_account_spec(),
        balance_equals(),
        withdrawn(),
        new_balance(),
        client(),
    ] {
        source.insert(class.name.clone(), class.encode());
    }
    source
}

pub fn vm() -> Vm {
    Vm::new(Arc::new(bank()), Arc::new(Weaver::default())).unwrap()
}

pub fn balance(vm: &mut Vm, account: Value) -> i32 {
    vm.invoke_virtual(account, "getBalance", "()I", &[])
        .unwrap()
        .unwrap()
        .as_int()
        .unwrap()
}

pub fn is_precondition(result: &Result<Option<Value>, VmError>) -> bool {
    matches!(result, Err(e) if e.violation().map_or(false, |v| v.is_precondition()))
}

pub fn is_postcondition(result: &Result<Option<Value>, VmError>) -> bool {
    matches!(result, Err(e) if e.violation().map_or(false, |v| v.is_postcondition()))
}
