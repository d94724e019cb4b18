use std::path::PathBuf;

use anchor_lang::prelude::*;
use anchor_lang::solana_program::instruction::Instruction;
use anchor_lang::{InstructionData, ToAccountMetas};
use litesvm::LiteSVM;
use solana_sdk::instruction::InstructionError;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::{Transaction, TransactionError};

use crate::YankenpoError;

pub const SOL: u64 = 1_000_000_000;

/// `cargo test-sbf` exports SBF_OUT_DIR; `cargo build-sbf` alone writes to target/deploy.
fn program_path() -> PathBuf {
    match std::env::var("SBF_OUT_DIR") {
        Ok(dir) => PathBuf::from(dir).join("yankenpo.so"),
        Err(_) => PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/deploy/yankenpo.so"),
    }
}

pub fn deploy_program(litesvm: &mut LiteSVM) {
    litesvm
        .add_program_from_file(crate::ID, program_path())
        .expect("Failed to read program binary");
}

pub fn funded_keypair(litesvm: &mut LiteSVM, lamports: u64) -> Keypair {
    let keypair = Keypair::new();
    litesvm.airdrop(&keypair.pubkey(), lamports).unwrap();
    keypair
}

pub fn build_instruction(accounts: impl ToAccountMetas, args: impl InstructionData) -> Instruction {
    Instruction {
        program_id: crate::ID,
        accounts: accounts.to_account_metas(None),
        data: args.data(),
    }
}

/// Every transaction gets a fresh blockhash so repeated calls are never deduplicated.
pub fn send_transaction_from_instructions(
    litesvm: &mut LiteSVM,
    instructions: Vec<Instruction>,
    signers: &[&Keypair],
    fee_payer: &Pubkey,
) -> std::result::Result<(), TransactionError> {
    litesvm.expire_blockhash();
    let transaction = Transaction::new_signed_with_payer(
        &instructions,
        Some(fee_payer),
        signers,
        litesvm.latest_blockhash(),
    );
    litesvm
        .send_transaction(transaction)
        .map(|_| ())
        .map_err(|failed| failed.err)
}

pub fn assert_program_error(result: std::result::Result<(), TransactionError>, expected: YankenpoError) {
    assert_eq!(
        result,
        Err(TransactionError::InstructionError(0, InstructionError::Custom(u32::from(expected)))),
    );
}

pub fn balance(litesvm: &LiteSVM, address: &Pubkey) -> u64 {
    litesvm.get_balance(address).unwrap_or(0)
}

pub fn check_account_is_closed(litesvm: &LiteSVM, address: &Pubkey) -> bool {
    litesvm.get_account(address).map_or(true, |account| account.lamports == 0)
}

pub fn fetch_account<T: AccountDeserialize>(litesvm: &LiteSVM, address: &Pubkey) -> T {
    let account = litesvm.get_account(address).expect("account should exist");
    T::try_deserialize(&mut account.data.as_slice()).unwrap()
}

pub fn advance_clock(litesvm: &mut LiteSVM, seconds: i64) {
    let mut clock = litesvm.get_sysvar::<Clock>();
    clock.unix_timestamp += seconds;
    litesvm.set_sysvar::<Clock>(&clock);
}
