use anchor_lang::prelude::*;
use anchor_lang::solana_program::program::invoke;
use anchor_lang::solana_program::system_instruction;

declare_id!("HDEWNEhmBS8sGAZEiYDMCDYbYSh34t9gA2cM6UKmU37Y");

#[cfg(all(test, feature = "test-sbf"))]
mod test_helpers;

// ── Constants ─────────────────────────────────────────────────────────────
pub const COMMISSION_PERCENT:    u8  = 7;
pub const WIN_THRESHOLD:         u8  = 3;
pub const DEFAULT_ROUND_TIMEOUT: i64 = 18_000;   // 5h for registry-hosted matches

pub const REGISTRY_SEED: &[u8] = b"registry";
pub const RECORD_SEED:   &[u8] = b"record";
pub const MATCH_SEED:    &[u8] = b"match";
pub const ROUND_SEED:    &[u8] = b"round";

// ── Flow ──────────────────────────────────────────────────────────────────
//
// Standalone:  create_match → start_match → join_match → rounds → withdraw
// Registry:    create_game (match opens already Started) → join_game → rounds → withdraw
//
// Each round: player 1 commits blake3(choice || nonce), player 2 plays in
// the clear, player 1 reveals. First side to WIN_THRESHOLD round wins takes
// the whole escrow. A stalled round can be forced once round_timeout passes.

#[program]
pub mod yankenpo {
    use super::*;

    // ── Registry: Initialize ──────────────────────────────────────
    pub fn initialize_registry(ctx: Context<InitializeRegistry>) -> Result<()> {
        let registry = &mut ctx.accounts.registry;
        registry.authority          = ctx.accounts.authority.key();
        registry.commission_percent = COMMISSION_PERCENT;
        registry.commission         = 0;
        registry.game_count         = 0;
        registry.paused             = false;
        registry.bump               = ctx.bumps.registry;
        Ok(())
    }

    // ── Registry: Create gated game (creator stakes immediately) ──
    pub fn create_game(ctx: Context<CreateGame>, access_lock: [u8; 32], stake: u64) -> Result<()> {
        let now          = Clock::get()?.unix_timestamp;
        let creator      = ctx.accounts.creator.key();
        let registry_key = ctx.accounts.registry.key();
        let game_key     = ctx.accounts.game.key();

        let mut record = ctx.accounts.registry.create_game(creator, access_lock, stake)?;
        record.game = game_key;
        record.bump = ctx.bumps.record;

        let commission = record.commission;
        let net_stake  = stake.checked_sub(commission).ok_or(YankenpoError::MathOverflow)?;

        let mut game = Yankenpo::open(
            record.id, registry_key, creator, creator,
            net_stake, DEFAULT_ROUND_TIMEOUT, Some(access_lock),
        )?;
        game.bump = ctx.bumps.game;
        game.start(creator, net_stake, now)?;

        let id = record.id;
        ctx.accounts.record.set_inner(record);
        ctx.accounts.game.set_inner(game);

        let creator_ai = ctx.accounts.creator.to_account_info();
        deposit(&creator_ai, &ctx.accounts.game.to_account_info(), net_stake)?;
        deposit(&creator_ai, &ctx.accounts.registry.to_account_info(), commission)?;

        emit!(GameCreated  { id, creator, stake });
        emit!(MatchStarted { player_1: creator, stake: net_stake });
        Ok(())
    }

    // ── Registry: Join gated game with the invitation secret ──────
    pub fn join_game(ctx: Context<JoinGame>, id: u64, secret: [u8; 32], amount: u64) -> Result<()> {
        let now    = Clock::get()?.unix_timestamp;
        let joiner = ctx.accounts.joiner.key();

        let record     = &mut ctx.accounts.record;
        let commission = ctx.accounts.registry.join_game(record, joiner, &secret, amount)?;
        let net_stake  = amount.checked_sub(commission).ok_or(YankenpoError::MathOverflow)?;

        let game = &mut ctx.accounts.game;
        game.join(joiner, net_stake, Some(&secret), now)?;
        let player_1    = game.player_1;
        let total_stake = game.pending_escrow;

        let joiner_ai = ctx.accounts.joiner.to_account_info();
        deposit(&joiner_ai, &ctx.accounts.game.to_account_info(), net_stake)?;
        deposit(&joiner_ai, &ctx.accounts.registry.to_account_info(), commission)?;

        emit!(GameJoined { id, joiner, stake: amount });
        emit!(MatchReady { player_1, player_2: joiner, total_stake });
        Ok(())
    }

    // ── Registry: Withdraw accrued commission ─────────────────────
    pub fn withdraw_commission(ctx: Context<WithdrawCommission>) -> Result<()> {
        let authority = ctx.accounts.authority.key();
        let amount    = ctx.accounts.registry.withdraw_commission(authority)?;

        payout(&ctx.accounts.registry.to_account_info(), &ctx.accounts.to.to_account_info(), amount)?;

        let to = ctx.accounts.to.key();
        msg!("Commission withdrawn: {} lamports → {}", amount, to);
        emit!(CommissionWithdrawn { to, amount });
        Ok(())
    }

    // ── Registry: Pause / Unpause ─────────────────────────────────
    pub fn pause(ctx: Context<AdminOnly>) -> Result<()> {
        let authority = ctx.accounts.authority.key();
        ctx.accounts.registry.pause(authority)?;
        emit!(Paused { authority });
        Ok(())
    }

    pub fn unpause(ctx: Context<AdminOnly>) -> Result<()> {
        let authority = ctx.accounts.authority.key();
        ctx.accounts.registry.unpause(authority)?;
        emit!(Unpaused { authority });
        Ok(())
    }

    // ── Match: Create standalone match ────────────────────────────
    pub fn create_match(
        ctx:           Context<CreateMatch>,
        id:            u64,
        player_1:      Pubkey,
        stake:         u64,
        round_timeout: i64,
        access_lock:   Option<[u8; 32]>,
    ) -> Result<()> {
        let owner = ctx.accounts.owner.key();
        let mut game = Yankenpo::open(id, owner, owner, player_1, stake, round_timeout, access_lock)?;
        game.bump = ctx.bumps.game;
        ctx.accounts.game.set_inner(game);
        Ok(())
    }

    // ── Match: Escrow player 1's stake ────────────────────────────
    pub fn start_match(ctx: Context<StartMatch>, amount: u64) -> Result<()> {
        let now   = Clock::get()?.unix_timestamp;
        let payer = ctx.accounts.payer.key();

        let game = &mut ctx.accounts.game;
        game.start(payer, amount, now)?;
        let player_1 = game.player_1;

        deposit(&ctx.accounts.payer.to_account_info(), &ctx.accounts.game.to_account_info(), amount)?;

        emit!(MatchStarted { player_1, stake: amount });
        Ok(())
    }

    // ── Match: Cancel before anyone joined (refund player 1) ──────
    pub fn cancel_match(ctx: Context<CancelMatch>) -> Result<()> {
        let player_1 = ctx.accounts.player_1.key();
        let refund   = ctx.accounts.game.cancel(player_1)?;

        payout(&ctx.accounts.game.to_account_info(), &ctx.accounts.player_1.to_account_info(), refund)?;

        emit!(MatchCancelled { player_1, stake: refund });
        Ok(())
    }

    // ── Match: Escrow player 2's matching stake ───────────────────
    pub fn join_match(
        ctx:      Context<JoinMatch>,
        player_2: Pubkey,
        amount:   u64,
        secret:   Option<[u8; 32]>,
    ) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;

        let game = &mut ctx.accounts.game;
        game.join(player_2, amount, secret.as_ref(), now)?;
        let player_1    = game.player_1;
        let total_stake = game.pending_escrow;

        deposit(&ctx.accounts.payer.to_account_info(), &ctx.accounts.game.to_account_info(), amount)?;

        emit!(MatchReady { player_1, player_2, total_stake });
        Ok(())
    }

    // ── Round: Player 1 commits blake3(choice || nonce) ───────────
    pub fn commit_round(ctx: Context<CommitRound>, commit_hash: [u8; 32]) -> Result<()> {
        let now      = Clock::get()?.unix_timestamp;
        let caller   = ctx.accounts.player_1.key();
        let game_key = ctx.accounts.game.key();

        let round = &mut ctx.accounts.round;
        round.game = game_key;
        round.bump = ctx.bumps.round;

        let game = &mut ctx.accounts.game;
        game.commit_round(round, caller, commit_hash, now)?;

        emit!(RoundCommitted { round_index: round.index, player_1: game.player_1, player_2: game.player_two()? });
        Ok(())
    }

    // ── Round: Player 2 answers in the clear ──────────────────────
    pub fn play_round(ctx: Context<PlayRound>, choice: Choice) -> Result<()> {
        let now    = Clock::get()?.unix_timestamp;
        let caller = ctx.accounts.player_2.key();

        let round = &mut ctx.accounts.round;
        let game  = &mut ctx.accounts.game;
        game.play_round(round, caller, choice, now)?;

        emit!(RoundPlayed { round_index: round.index, player_1: game.player_1, player_2: game.player_two()? });
        Ok(())
    }

    // ── Round: Player 1 opens the commitment, round resolves ──────
    pub fn reveal_round(ctx: Context<RevealRound>, choice: Choice, nonce: [u8; 32]) -> Result<()> {
        let now    = Clock::get()?.unix_timestamp;
        let caller = ctx.accounts.player_1.key();

        let round = &mut ctx.accounts.round;
        let game  = &mut ctx.accounts.game;
        let outcome = game.reveal_round(round, caller, choice, &nonce, now)?;

        emit!(RoundRevealed { round_index: round.index, player_1: game.player_1, player_2: game.player_two()? });
        if let Some(winner) = game.winner {
            msg!("Match finished after round {} ({:?}): winner {}", round.index, outcome, winner);
        }
        Ok(())
    }

    // ── Round: Force a stalled round once round_timeout passed ────
    pub fn claim_round_timeout(ctx: Context<ClaimRoundTimeout>) -> Result<()> {
        let now    = Clock::get()?.unix_timestamp;
        let caller = ctx.accounts.caller.key();

        let round = ctx.accounts.round.as_deref_mut();
        let game  = &mut ctx.accounts.game;
        let (round_index, winner) = game.claim_round_timeout(round, caller, now)?;

        msg!("Round {} forfeited to {}", round_index, winner);
        emit!(RoundForfeited { round_index, winner });
        Ok(())
    }

    // ── Match: Winner takes the pot (pay-once) ────────────────────
    pub fn withdraw(ctx: Context<Withdraw>) -> Result<()> {
        let winner = ctx.accounts.winner.key();
        let amount = ctx.accounts.game.withdraw(winner)?;

        payout(&ctx.accounts.game.to_account_info(), &ctx.accounts.winner.to_account_info(), amount)?;

        emit!(Withdrawn { winner, amount });
        Ok(())
    }

    // ── Cleanup: reclaim rent once the match is terminal ──────────
    pub fn close_round(ctx: Context<CloseRound>) -> Result<()> {
        ctx.accounts.game.release_round()
    }

    pub fn close_match(ctx: Context<CloseMatch>) -> Result<()> {
        ctx.accounts.game.ensure_closable()
    }
}

// ══════════════════════════════════════════════════════════════════════════
//  HELPERS
// ══════════════════════════════════════════════════════════════════════════

/// Commitment player 1 stores before player 2 answers.
pub fn commitment(choice: Choice, nonce: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[choice as u8]);
    hasher.update(nonce);
    *hasher.finalize().as_bytes()
}

/// Lock stored on gated matches; joiners must present its preimage.
pub fn access_lock(secret: &[u8; 32]) -> [u8; 32] {
    *blake3::hash(secret).as_bytes()
}

/// Signer → escrow (or registry) via System Program. Fails if the signer is short.
fn deposit<'info>(from: &AccountInfo<'info>, to: &AccountInfo<'info>, amount: u64) -> Result<()> {
    if amount == 0 {
        return Ok(());
    }
    let ix = system_instruction::transfer(from.key, to.key, amount);
    invoke(&ix, &[from.clone(), to.clone()])?;
    Ok(())
}

/// Program-owned escrow → recipient. Never dips into the rent-exempt reserve.
fn payout<'info>(from: &AccountInfo<'info>, to: &AccountInfo<'info>, amount: u64) -> Result<()> {
    if amount == 0 {
        return Ok(());
    }
    let rent = Rent::get()?.minimum_balance(from.data_len());
    require!(
        from.lamports().saturating_sub(rent) >= amount,
        YankenpoError::InsufficientEscrow
    );

    **from.try_borrow_mut_lamports()? -= amount;
    **to.try_borrow_mut_lamports()?   += amount;
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════
//  ACCOUNTS
// ══════════════════════════════════════════════════════════════════════════

#[derive(Accounts)]
pub struct InitializeRegistry<'info> {
    #[account(init, payer = authority, space = 8 + Registry::LEN,
              seeds = [REGISTRY_SEED], bump)]
    pub registry: Account<'info, Registry>,
    #[account(mut)] pub authority: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct CreateGame<'info> {
    #[account(mut, seeds = [REGISTRY_SEED], bump = registry.bump)]
    pub registry: Account<'info, Registry>,
    #[account(init, payer = creator, space = 8 + GameRecord::LEN,
              seeds = [RECORD_SEED, registry.key().as_ref(), registry.game_count.to_le_bytes().as_ref()], bump)]
    pub record: Account<'info, GameRecord>,
    #[account(init, payer = creator, space = 8 + Yankenpo::LEN,
              seeds = [MATCH_SEED, registry.key().as_ref(), registry.game_count.to_le_bytes().as_ref()], bump)]
    pub game: Account<'info, Yankenpo>,
    #[account(mut)] pub creator: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
#[instruction(id: u64)]
pub struct JoinGame<'info> {
    #[account(mut, seeds = [REGISTRY_SEED], bump = registry.bump)]
    pub registry: Account<'info, Registry>,
    #[account(mut, seeds = [RECORD_SEED, registry.key().as_ref(), id.to_le_bytes().as_ref()],
              bump = record.bump)]
    pub record: Account<'info, GameRecord>,
    #[account(mut, address = record.game)]
    pub game: Account<'info, Yankenpo>,
    #[account(mut)] pub joiner: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct WithdrawCommission<'info> {
    #[account(mut, seeds = [REGISTRY_SEED], bump = registry.bump)]
    pub registry: Account<'info, Registry>,
    pub authority: Signer<'info>,
    /// CHECK: any wallet chosen by the authority; only credited lamports.
    #[account(mut)]
    pub to: UncheckedAccount<'info>,
}

#[derive(Accounts)]
pub struct AdminOnly<'info> {
    #[account(mut, seeds = [REGISTRY_SEED], bump = registry.bump)]
    pub registry: Account<'info, Registry>,
    pub authority: Signer<'info>,
}

#[derive(Accounts)]
#[instruction(id: u64)]
pub struct CreateMatch<'info> {
    #[account(init, payer = owner, space = 8 + Yankenpo::LEN,
              seeds = [MATCH_SEED, owner.key().as_ref(), id.to_le_bytes().as_ref()], bump)]
    pub game: Account<'info, Yankenpo>,
    #[account(mut)] pub owner: Signer<'info>,
    pub system_program: Program<'info, System>,
}

/// Registry-hosted matches only take stakes through the registry.
#[derive(Accounts)]
pub struct StartMatch<'info> {
    #[account(mut, seeds = [MATCH_SEED, game.host.as_ref(), game.id.to_le_bytes().as_ref()],
              bump = game.bump, constraint = game.is_standalone() @ YankenpoError::Unauthorized)]
    pub game: Account<'info, Yankenpo>,
    #[account(mut)] pub payer: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct JoinMatch<'info> {
    #[account(mut, seeds = [MATCH_SEED, game.host.as_ref(), game.id.to_le_bytes().as_ref()],
              bump = game.bump, constraint = game.is_standalone() @ YankenpoError::Unauthorized)]
    pub game: Account<'info, Yankenpo>,
    #[account(mut)] pub payer: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct CancelMatch<'info> {
    #[account(mut, seeds = [MATCH_SEED, game.host.as_ref(), game.id.to_le_bytes().as_ref()],
              bump = game.bump, constraint = game.is_standalone() @ YankenpoError::Unauthorized)]
    pub game: Account<'info, Yankenpo>,
    #[account(mut)] pub player_1: Signer<'info>,
}

#[derive(Accounts)]
pub struct CommitRound<'info> {
    #[account(mut, seeds = [MATCH_SEED, game.host.as_ref(), game.id.to_le_bytes().as_ref()],
              bump = game.bump)]
    pub game: Account<'info, Yankenpo>,
    #[account(init, payer = player_1, space = 8 + Round::LEN,
              seeds = [ROUND_SEED, game.key().as_ref(), game.current_round.to_le_bytes().as_ref()], bump)]
    pub round: Account<'info, Round>,
    #[account(mut)] pub player_1: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct PlayRound<'info> {
    #[account(mut, seeds = [MATCH_SEED, game.host.as_ref(), game.id.to_le_bytes().as_ref()],
              bump = game.bump)]
    pub game: Account<'info, Yankenpo>,
    #[account(mut, seeds = [ROUND_SEED, game.key().as_ref(), game.current_round.to_le_bytes().as_ref()],
              bump = round.bump)]
    pub round: Account<'info, Round>,
    pub player_2: Signer<'info>,
}

#[derive(Accounts)]
pub struct RevealRound<'info> {
    #[account(mut, seeds = [MATCH_SEED, game.host.as_ref(), game.id.to_le_bytes().as_ref()],
              bump = game.bump)]
    pub game: Account<'info, Yankenpo>,
    #[account(mut, seeds = [ROUND_SEED, game.key().as_ref(), game.current_round.to_le_bytes().as_ref()],
              bump = round.bump)]
    pub round: Account<'info, Round>,
    pub player_1: Signer<'info>,
}

/// `round` is omitted when player 1 stalls before committing.
#[derive(Accounts)]
pub struct ClaimRoundTimeout<'info> {
    #[account(mut, seeds = [MATCH_SEED, game.host.as_ref(), game.id.to_le_bytes().as_ref()],
              bump = game.bump)]
    pub game: Account<'info, Yankenpo>,
    #[account(mut, seeds = [ROUND_SEED, game.key().as_ref(), game.current_round.to_le_bytes().as_ref()],
              bump = round.bump)]
    pub round: Option<Account<'info, Round>>,
    pub caller: Signer<'info>,
}

#[derive(Accounts)]
pub struct Withdraw<'info> {
    #[account(mut, seeds = [MATCH_SEED, game.host.as_ref(), game.id.to_le_bytes().as_ref()],
              bump = game.bump)]
    pub game: Account<'info, Yankenpo>,
    #[account(mut)] pub winner: Signer<'info>,
}

#[derive(Accounts)]
pub struct CloseRound<'info> {
    #[account(mut, seeds = [MATCH_SEED, game.host.as_ref(), game.id.to_le_bytes().as_ref()],
              bump = game.bump)]
    pub game: Account<'info, Yankenpo>,
    #[account(mut, close = player_1, has_one = game,
              seeds = [ROUND_SEED, game.key().as_ref(), round.index.to_le_bytes().as_ref()],
              bump = round.bump)]
    pub round: Account<'info, Round>,
    /// Paid the round's rent at commit time.
    #[account(mut, address = game.player_1 @ YankenpoError::NotPlayerOne)]
    pub player_1: Signer<'info>,
}

#[derive(Accounts)]
pub struct CloseMatch<'info> {
    #[account(mut, close = owner, has_one = owner @ YankenpoError::Unauthorized,
              seeds = [MATCH_SEED, game.host.as_ref(), game.id.to_le_bytes().as_ref()],
              bump = game.bump)]
    pub game: Account<'info, Yankenpo>,
    #[account(mut)] pub owner: Signer<'info>,
}

// ══════════════════════════════════════════════════════════════════════════
//  STATE
// ══════════════════════════════════════════════════════════════════════════

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Choice {
    /// Guard value: never accepted as a play, never opens a commitment.
    None     = 0,
    Rock     = 1,
    Paper    = 2,
    Scissors = 3,
}

impl Choice {
    pub fn is_real(self) -> bool {
        self != Choice::None
    }

    pub fn beats(self, other: Choice) -> bool {
        matches!(
            (self, other),
            (Choice::Rock, Choice::Scissors)
                | (Choice::Scissors, Choice::Paper)
                | (Choice::Paper, Choice::Rock)
        )
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum RoundOutcome {
    Pending,
    Tie,
    PlayerOne,
    PlayerTwo,
}

impl RoundOutcome {
    /// Equal choices tie; otherwise whoever's choice beats the other's takes it.
    pub fn resolve(player_1: Choice, player_2: Choice) -> Self {
        if player_1 == player_2 {
            RoundOutcome::Tie
        } else if player_1.beats(player_2) {
            RoundOutcome::PlayerOne
        } else {
            RoundOutcome::PlayerTwo
        }
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum MatchState {
    NotStarted,
    Started,
    Ready,
    Finished,
    Settled,
    Cancelled,
}

#[account]
pub struct Registry {
    pub authority:          Pubkey,  // 32
    pub commission_percent: u8,      // 1
    pub commission:         u64,     // 8, accrued, not yet withdrawn
    pub game_count:         u64,     // 8, next sequential id
    pub paused:             bool,    // 1
    pub bump:               u8,      // 1
}
impl Registry { pub const LEN: usize = 32 + 1 + 8 + 8 + 1 + 1; }

impl Registry {
    pub fn commission_for(&self, stake: u64) -> Result<u64> {
        let scaled = stake
            .checked_mul(self.commission_percent as u64)
            .ok_or(YankenpoError::MathOverflow)?;
        Ok(scaled / 100)
    }

    /// Allocates the next id and accrues the creator's commission.
    /// The returned record still needs its match address and bump.
    pub fn create_game(&mut self, creator: Pubkey, access_lock: [u8; 32], stake: u64) -> Result<GameRecord> {
        require!(!self.paused, YankenpoError::Paused);
        require!(stake > 0,    YankenpoError::ValueMismatch);

        let fee        = self.commission_for(stake)?;
        let commission = self.commission.checked_add(fee).ok_or(YankenpoError::MathOverflow)?;
        let game_count = self.game_count.checked_add(1).ok_or(YankenpoError::MathOverflow)?;

        let record = GameRecord {
            id: self.game_count,
            creator,
            access_lock,
            stake,
            joiner: None,
            commission: fee,
            game: Pubkey::default(),
            bump: 0,
        };
        self.commission = commission;
        self.game_count = game_count;
        Ok(record)
    }

    /// Admits `joiner` into `record`, returning the commission skimmed from `amount`.
    pub fn join_game(
        &mut self,
        record: &mut GameRecord,
        joiner: Pubkey,
        secret: &[u8; 32],
        amount: u64,
    ) -> Result<u64> {
        require!(!self.paused,                             YankenpoError::Paused);
        require!(record.id < self.game_count,              YankenpoError::UnknownGame);
        require!(access_lock(secret) == record.access_lock, YankenpoError::AccessDenied);
        require!(amount == record.stake,                   YankenpoError::ValueMismatch);
        require!(record.joiner.is_none(),                  YankenpoError::AlreadyJoined);

        let fee               = self.commission_for(amount)?;
        let commission        = self.commission.checked_add(fee).ok_or(YankenpoError::MathOverflow)?;
        let record_commission = record.commission.checked_add(fee).ok_or(YankenpoError::MathOverflow)?;

        self.commission   = commission;
        record.commission = record_commission;
        record.joiner     = Some(joiner);
        Ok(fee)
    }

    /// Empties the commission pool; the caller moves the lamports.
    pub fn withdraw_commission(&mut self, caller: Pubkey) -> Result<u64> {
        require_keys_eq!(caller, self.authority, YankenpoError::Unauthorized);
        let amount = self.commission;
        self.commission = 0;
        Ok(amount)
    }

    pub fn pause(&mut self, caller: Pubkey) -> Result<()> {
        require_keys_eq!(caller, self.authority, YankenpoError::Unauthorized);
        require!(!self.paused, YankenpoError::InvalidState);
        self.paused = true;
        Ok(())
    }

    pub fn unpause(&mut self, caller: Pubkey) -> Result<()> {
        require_keys_eq!(caller, self.authority, YankenpoError::Unauthorized);
        require!(self.paused, YankenpoError::InvalidState);
        self.paused = false;
        Ok(())
    }
}

#[account]
pub struct GameRecord {
    pub id:          u64,             // 8
    pub creator:     Pubkey,          // 32
    pub access_lock: [u8; 32],        // 32, blake3(secret)
    pub stake:       u64,             // 8, gross, per player
    pub joiner:      Option<Pubkey>,  // 1 + 32 = 33
    pub commission:  u64,             // 8, this record's contribution to the pool
    pub game:        Pubkey,          // 32, embedded match
    pub bump:        u8,              // 1
}
impl GameRecord { pub const LEN: usize = 8 + 32 + 32 + 8 + 33 + 8 + 32 + 1; }

impl GameRecord {
    pub fn is_joined(&self) -> bool {
        self.joiner.is_some()
    }
}

/// One wagered match. The account itself holds the escrowed lamports.
#[account]
pub struct Yankenpo {
    pub id:              u64,              // 8
    pub host:            Pubkey,           // 32, PDA seed key: owner wallet or registry
    pub owner:           Pubkey,           // 32, receives rent on close
    pub player_1:        Pubkey,           // 32
    pub player_2:        Option<Pubkey>,   // 1 + 32 = 33
    pub access_lock:     Option<[u8; 32]>, // 1 + 32 = 33
    pub stake:           u64,              // 8, per player, immutable
    pub pending_escrow:  u64,              // 8
    pub round_timeout:   i64,              // 8, seconds
    pub state:           MatchState,       // 1
    pub current_round:   u32,              // 4
    pub round_open:      bool,             // 1
    pub rounds_resolved: u32,              // 4
    pub live_rounds:     u32,              // 4, round accounts not yet closed
    pub player_1_wins:   u8,               // 1
    pub player_2_wins:   u8,               // 1
    pub winner:          Option<Pubkey>,   // 1 + 32 = 33
    pub settled:         bool,             // 1
    pub last_action_at:  i64,              // 8
    pub bump:            u8,               // 1
}
impl Yankenpo {
    pub const LEN: usize = 8 + 32 + 32 + 32 + 33 + 33 + 8 + 8 + 8 + 1 + 4 + 1 + 4 + 4 + 1 + 1 + 33 + 1 + 8 + 1;
}

impl Yankenpo {
    pub fn open(
        id:            u64,
        host:          Pubkey,
        owner:         Pubkey,
        player_1:      Pubkey,
        stake:         u64,
        round_timeout: i64,
        access_lock:   Option<[u8; 32]>,
    ) -> Result<Self> {
        require!(stake > 0,         YankenpoError::ValueMismatch);
        require!(round_timeout > 0, YankenpoError::InvalidTimeout);

        Ok(Self {
            id,
            host,
            owner,
            player_1,
            player_2: None,
            access_lock,
            stake,
            pending_escrow: 0,
            round_timeout,
            state: MatchState::NotStarted,
            current_round: 0,
            round_open: false,
            rounds_resolved: 0,
            live_rounds: 0,
            player_1_wins: 0,
            player_2_wins: 0,
            winner: None,
            settled: false,
            last_action_at: 0,
            bump: 0,
        })
    }

    pub fn is_standalone(&self) -> bool {
        self.host == self.owner
    }

    pub fn is_started(&self) -> bool {
        self.state == MatchState::Started
    }

    pub fn is_ready(&self) -> bool {
        self.state == MatchState::Ready
    }

    pub fn is_finished(&self) -> bool {
        self.state == MatchState::Finished
    }

    pub fn player_two(&self) -> Result<Pubkey> {
        self.player_2.ok_or_else(|| error!(YankenpoError::InvalidState))
    }

    pub fn total_pot(&self) -> Result<u64> {
        self.stake.checked_mul(2).ok_or_else(|| error!(YankenpoError::MathOverflow))
    }

    /// Index of the committed-but-unresolved round, if any.
    pub fn current_round(&self) -> Option<u32> {
        self.round_open.then_some(self.current_round)
    }

    pub fn start(&mut self, caller: Pubkey, amount: u64, now: i64) -> Result<()> {
        require!(caller == self.owner || caller == self.player_1, YankenpoError::Unauthorized);
        require!(self.state == MatchState::NotStarted,            YankenpoError::InvalidState);
        require!(amount == self.stake,                            YankenpoError::ValueMismatch);

        self.pending_escrow = amount;
        self.state          = MatchState::Started;
        self.last_action_at = now;
        Ok(())
    }

    /// Returns the refund owed to player 1. Registry-hosted matches stay
    /// open until joined.
    pub fn cancel(&mut self, caller: Pubkey) -> Result<u64> {
        require!(self.is_standalone(),          YankenpoError::Unauthorized);
        require_keys_eq!(caller, self.player_1, YankenpoError::NotPlayerOne);
        require!(self.player_2.is_none(),       YankenpoError::AlreadyJoined);
        require!(self.state == MatchState::Started, YankenpoError::InvalidState);

        let refund = self.pending_escrow;
        self.pending_escrow = 0;
        self.state          = MatchState::Cancelled;
        Ok(refund)
    }

    pub fn join(&mut self, player_2: Pubkey, amount: u64, secret: Option<&[u8; 32]>, now: i64) -> Result<()> {
        require!(self.player_2.is_none(),           YankenpoError::AlreadyJoined);
        require!(self.state == MatchState::Started, YankenpoError::InvalidState);
        require_keys_neq!(player_2, self.player_1,  YankenpoError::Unauthorized);
        require!(amount == self.stake,              YankenpoError::ValueMismatch);
        if let Some(lock) = self.access_lock {
            let opened = secret.map(access_lock) == Some(lock);
            require!(opened, YankenpoError::AccessDenied);
        }

        let pending_escrow = self.pending_escrow.checked_add(amount).ok_or(YankenpoError::MathOverflow)?;
        self.player_2       = Some(player_2);
        self.pending_escrow = pending_escrow;
        self.state          = MatchState::Ready;
        self.last_action_at = now;
        Ok(())
    }

    pub fn commit_round(&mut self, round: &mut Round, caller: Pubkey, commit_hash: [u8; 32], now: i64) -> Result<()> {
        require_keys_eq!(caller, self.player_1,   YankenpoError::NotPlayerOne);
        require!(self.state == MatchState::Ready, YankenpoError::InvalidState);
        require!(!self.round_open,                YankenpoError::RoundAlreadyOpen);
        let live_rounds = self.live_rounds.checked_add(1).ok_or(YankenpoError::MathOverflow)?;

        round.index           = self.current_round;
        round.commit_hash     = commit_hash;
        round.player_1_choice = Choice::None;
        round.player_2_choice = Choice::None;
        round.committed_at    = now;
        round.played_at       = 0;
        round.resolved        = false;
        round.forfeited       = false;
        round.outcome         = RoundOutcome::Pending;

        self.live_rounds    = live_rounds;
        self.round_open     = true;
        self.last_action_at = now;
        Ok(())
    }

    pub fn play_round(&mut self, round: &mut Round, caller: Pubkey, choice: Choice, now: i64) -> Result<()> {
        require!(Some(caller) == self.player_2,     YankenpoError::NotPlayerTwo);
        require!(self.state == MatchState::Ready,   YankenpoError::InvalidState);
        self.ensure_open(round)?;
        require!(!round.player_2_choice.is_real(),  YankenpoError::RoundAlreadyPlayed);
        require!(choice.is_real(),                  YankenpoError::InvalidChoice);

        round.player_2_choice = choice;
        round.played_at       = now;
        self.last_action_at   = now;
        Ok(())
    }

    pub fn reveal_round(
        &mut self,
        round:  &mut Round,
        caller: Pubkey,
        choice: Choice,
        nonce:  &[u8; 32],
        now:    i64,
    ) -> Result<RoundOutcome> {
        require_keys_eq!(caller, self.player_1,   YankenpoError::NotPlayerOne);
        require!(self.state == MatchState::Ready, YankenpoError::InvalidState);
        self.ensure_open(round)?;
        require!(round.player_2_choice.is_real(), YankenpoError::RoundNotPlayed);
        require!(
            choice.is_real() && commitment(choice, nonce) == round.commit_hash,
            YankenpoError::RevealMismatch
        );

        let outcome = RoundOutcome::resolve(choice, round.player_2_choice);
        self.settle_round(outcome, now)?;

        round.player_1_choice = choice;
        round.outcome         = outcome;
        round.resolved        = true;
        Ok(outcome)
    }

    /// Awards the stalled round to the party that did act, returning
    /// `(round_index, round_winner)`.
    pub fn claim_round_timeout(&mut self, round: Option<&mut Round>, caller: Pubkey, now: i64) -> Result<(u32, Pubkey)> {
        require!(self.state == MatchState::Ready, YankenpoError::InvalidState);
        let player_2 = self.player_two()?;
        let index    = self.current_round;

        let outcome = match (self.round_open, round) {
            (true, Some(round)) => {
                self.ensure_open(round)?;
                let outcome = if round.player_2_choice.is_real() {
                    // player 1 never revealed
                    require_keys_eq!(caller, player_2, YankenpoError::NotPlayerTwo);
                    self.ensure_expired(round.played_at, now)?;
                    RoundOutcome::PlayerTwo
                } else {
                    // player 2 never played
                    require_keys_eq!(caller, self.player_1, YankenpoError::NotPlayerOne);
                    self.ensure_expired(round.committed_at, now)?;
                    RoundOutcome::PlayerOne
                };
                self.settle_round(outcome, now)?;
                round.outcome   = outcome;
                round.resolved  = true;
                round.forfeited = true;
                outcome
            }
            (true, None) => return err!(YankenpoError::RoundNotOpen),
            (false, _) => {
                // player 1 never committed
                require_keys_eq!(caller, player_2, YankenpoError::NotPlayerTwo);
                self.ensure_expired(self.last_action_at, now)?;
                self.settle_round(RoundOutcome::PlayerTwo, now)?;
                RoundOutcome::PlayerTwo
            }
        };

        let winner = match outcome {
            RoundOutcome::PlayerOne => self.player_1,
            _ => player_2,
        };
        Ok((index, winner))
    }

    /// Pays out once: returns the amount owed to the winner.
    pub fn withdraw(&mut self, caller: Pubkey) -> Result<u64> {
        require!(!self.settled,                      YankenpoError::AlreadySettled);
        require!(self.state == MatchState::Finished, YankenpoError::AlreadySettled);
        require!(self.winner == Some(caller),        YankenpoError::AlreadySettled);

        let amount = self.total_pot()?;
        let pending_escrow = self
            .pending_escrow
            .checked_sub(amount)
            .ok_or(YankenpoError::InsufficientEscrow)?;

        self.pending_escrow = pending_escrow;
        self.settled        = true;
        self.state          = MatchState::Settled;
        Ok(amount)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, MatchState::Settled | MatchState::Cancelled)
    }

    /// Every round account has to be closed before the match itself.
    pub fn ensure_closable(&self) -> Result<()> {
        require!(self.is_terminal(),       YankenpoError::InvalidState);
        require!(self.pending_escrow == 0, YankenpoError::EscrowNotEmpty);
        require!(self.live_rounds == 0,    YankenpoError::RoundsOutstanding);
        Ok(())
    }

    /// Records one round account as closed.
    pub fn release_round(&mut self) -> Result<()> {
        require!(self.is_terminal(), YankenpoError::InvalidState);
        self.live_rounds = self.live_rounds.checked_sub(1).ok_or(YankenpoError::InvalidState)?;
        Ok(())
    }

    fn ensure_open(&self, round: &Round) -> Result<()> {
        require!(
            self.round_open && round.index == self.current_round && !round.resolved,
            YankenpoError::RoundNotOpen
        );
        Ok(())
    }

    fn ensure_expired(&self, since: i64, now: i64) -> Result<()> {
        let deadline = since.checked_add(self.round_timeout).ok_or(YankenpoError::MathOverflow)?;
        require!(now > deadline, YankenpoError::TimeoutNotElapsed);
        Ok(())
    }

    /// Applies a resolved round: counters, index advance, win threshold.
    fn settle_round(&mut self, outcome: RoundOutcome, now: i64) -> Result<()> {
        let (mut p1, mut p2) = (self.player_1_wins, self.player_2_wins);
        match outcome {
            RoundOutcome::PlayerOne => p1 = p1.checked_add(1).ok_or(YankenpoError::MathOverflow)?,
            RoundOutcome::PlayerTwo => p2 = p2.checked_add(1).ok_or(YankenpoError::MathOverflow)?,
            RoundOutcome::Tie | RoundOutcome::Pending => {}
        }
        let rounds_resolved = self.rounds_resolved.checked_add(1).ok_or(YankenpoError::MathOverflow)?;
        let current_round   = self.current_round.checked_add(1).ok_or(YankenpoError::MathOverflow)?;

        self.player_1_wins   = p1;
        self.player_2_wins   = p2;
        self.rounds_resolved = rounds_resolved;
        self.current_round   = current_round;
        self.round_open      = false;
        self.last_action_at  = now;

        if p1 >= WIN_THRESHOLD {
            self.winner = Some(self.player_1);
        } else if p2 >= WIN_THRESHOLD {
            self.winner = self.player_2;
        }
        if self.winner.is_some() {
            self.state = MatchState::Finished;
        }
        Ok(())
    }
}

#[account]
pub struct Round {
    pub game:            Pubkey,        // 32
    pub index:           u32,           // 4
    pub commit_hash:     [u8; 32],      // 32, blake3(choice || nonce)
    pub player_1_choice: Choice,        // 1, set on reveal
    pub player_2_choice: Choice,        // 1, set on play
    pub committed_at:    i64,           // 8
    pub played_at:       i64,           // 8
    pub resolved:        bool,          // 1
    pub forfeited:       bool,          // 1
    pub outcome:         RoundOutcome,  // 1
    pub bump:            u8,            // 1
}
impl Round { pub const LEN: usize = 32 + 4 + 32 + 1 + 1 + 8 + 8 + 1 + 1 + 1 + 1; }

// ══════════════════════════════════════════════════════════════════════════
//  ERRORS & EVENTS
// ══════════════════════════════════════════════════════════════════════════

#[error_code]
pub enum YankenpoError {
    #[msg("Operation not valid in the current match state")]
    InvalidState,
    #[msg("Caller is not allowed to perform this action")]
    Unauthorized,
    #[msg("Caller is not player 1")]
    NotPlayerOne,
    #[msg("Caller is not player 2")]
    NotPlayerTwo,
    #[msg("Attached value does not match the required stake")]
    ValueMismatch,
    #[msg("Access key do not match")]
    AccessDenied,
    #[msg("Revealed choice and nonce do not match the commitment")]
    RevealMismatch,
    #[msg("Nothing to withdraw")]
    AlreadySettled,
    #[msg("Registry is paused")]
    Paused,
    #[msg("Unknown game id")]
    UnknownGame,
    #[msg("Game already joined")]
    AlreadyJoined,
    #[msg("A round is already open")]
    RoundAlreadyOpen,
    #[msg("No open round")]
    RoundNotOpen,
    #[msg("Round already played")]
    RoundAlreadyPlayed,
    #[msg("Round not played yet")]
    RoundNotPlayed,
    #[msg("Choice must be Rock, Paper or Scissors")]
    InvalidChoice,
    #[msg("Round timeout has not elapsed")]
    TimeoutNotElapsed,
    #[msg("Round timeout must be positive")]
    InvalidTimeout,
    #[msg("Escrow still holds stakes")]
    EscrowNotEmpty,
    #[msg("Round accounts must be closed before the match")]
    RoundsOutstanding,
    #[msg("Escrow cannot cover the payout")]
    InsufficientEscrow,
    #[msg("Arithmetic overflow")]
    MathOverflow,
}

#[event] pub struct MatchStarted        { pub player_1: Pubkey, pub stake: u64 }
#[event] pub struct MatchReady          { pub player_1: Pubkey, pub player_2: Pubkey, pub total_stake: u64 }
#[event] pub struct MatchCancelled      { pub player_1: Pubkey, pub stake: u64 }
#[event] pub struct RoundCommitted      { pub round_index: u32, pub player_1: Pubkey, pub player_2: Pubkey }
#[event] pub struct RoundPlayed         { pub round_index: u32, pub player_1: Pubkey, pub player_2: Pubkey }
#[event] pub struct RoundRevealed       { pub round_index: u32, pub player_1: Pubkey, pub player_2: Pubkey }
#[event] pub struct RoundForfeited      { pub round_index: u32, pub winner: Pubkey }
#[event] pub struct Withdrawn           { pub winner: Pubkey, pub amount: u64 }
#[event] pub struct GameCreated         { pub id: u64, pub creator: Pubkey, pub stake: u64 }
#[event] pub struct GameJoined          { pub id: u64, pub joiner: Pubkey, pub stake: u64 }
#[event] pub struct CommissionWithdrawn { pub to: Pubkey, pub amount: u64 }
#[event] pub struct Paused              { pub authority: Pubkey }
#[event] pub struct Unpaused            { pub authority: Pubkey }
