use std::collections::HashSet;
use std::sync::RwLock;

use log::{debug, info};

use super::Block;
use crate::error::EconomyError;
use crate::transaction::Transaction;
use crate::wallet::{address_for_pubkey, verify_signature_hex};

/// In-memory Proof-of-Work ledger: the block chain plus the pool of pending
/// transactions. Both live behind the same lock (see `SharedLedger`) so that
/// submitting a transaction and sealing the pool into a block are each one
/// atomic unit: two miners can never fork the chain off one pool generation.
///
/// Balances are never stored. `balance_of` replays the whole chain on every
/// call; confirmed state is the only source of truth.
#[derive(Debug)]
pub struct Ledger {
    pub chain: Vec<Block>,
    pending: Vec<Transaction>,
    difficulty: u32,
    mining_reward: u64,
}

impl Ledger {
    /// Initialize a new ledger with a genesis block.
    pub fn new(difficulty: u32, mining_reward: u64) -> Self {
        let mut ledger = Self {
            chain: Vec::new(),
            pending: Vec::new(),
            difficulty,
            mining_reward,
        };
        ledger.chain.push(Block::genesis());
        ledger
    }

    /// Return the last block in the chain.
    pub fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("ledger always holds at least the genesis block")
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn mining_reward(&self) -> u64 {
        self.mining_reward
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Validate a transaction and push it into the pending pool. Minted
    /// credits (`from = None`) need no signature; debits must carry the
    /// sender's pubkey (owning the `from` address) and a valid signature.
    /// The funds gate for transfers lives in `submit_transfer`.
    pub fn submit_transaction(&mut self, tx: Transaction) -> Result<(), EconomyError> {
        if tx.amount == 0 {
            return Err(EconomyError::InvalidTransaction(
                "amount must be > 0".into(),
            ));
        }

        if let Some(from) = tx.from.as_deref() {
            let pubkey = tx.sender_pubkey.as_deref().ok_or_else(|| {
                EconomyError::InvalidTransaction("debit missing sender pubkey".into())
            })?;
            let derived = address_for_pubkey(pubkey)
                .map_err(|e| EconomyError::InvalidTransaction(e.into()))?;
            if derived != from {
                return Err(EconomyError::InvalidTransaction(
                    "sender pubkey does not own the from address".into(),
                ));
            }
            let signature = tx.signature.as_deref().ok_or_else(|| {
                EconomyError::InvalidTransaction("debit missing signature".into())
            })?;
            let ok = verify_signature_hex(pubkey, signature, tx.sighash())
                .map_err(|e| EconomyError::InvalidTransaction(e.into()))?;
            if !ok {
                return Err(EconomyError::InvalidTransaction("invalid signature".into()));
            }
        }

        let before = self.pending.len();
        debug!(
            "POOL - tx {} accepted ({} -> {} pending)",
            tx.id,
            before,
            before + 1
        );
        self.pending.push(tx);
        Ok(())
    }

    /// Gate a debiting transaction on the sender's available balance
    /// (confirmed balance minus already-pending outgoing amounts), then
    /// submit it. Gate and enqueue run under the same borrow, so two
    /// transfers can never jointly overdraw an address through this path.
    pub fn submit_transfer(&mut self, tx: Transaction) -> Result<(), EconomyError> {
        let from = tx.from.as_deref().ok_or_else(|| {
            EconomyError::InvalidTransaction("transfer requires a sender".into())
        })?;

        let available = self.balance_of(from) - self.pending_outgoing(from) as i128;
        if (tx.amount as i128) > available {
            return Err(EconomyError::InsufficientFunds {
                needed: tx.amount,
                available: available.max(0) as u64,
            });
        }
        self.submit_transaction(tx)
    }

    /// Assemble the next block candidate for `miner`: the reward transaction
    /// first, then a snapshot of the pending pool. The reward is part of the
    /// hashed content, so it is committed before mining starts.
    pub fn candidate_block(&self, miner: &str) -> Block {
        let mut txs = Vec::with_capacity(1 + self.pending.len());
        txs.push(Transaction::minted(miner, self.mining_reward));
        txs.extend(self.pending.iter().cloned());
        Block::new(self.last_block().hash.clone(), txs)
    }

    /// Append a mined block. Accepted only if its `previous_hash` still equals
    /// the current head (same pending-pool generation; the first successful
    /// append wins and competing blocks get `StaleBlock` to be discarded)
    /// and its hash meets content and difficulty checks. On success the
    /// included transactions are drained from the pending pool by id.
    pub fn try_append(&mut self, block: Block) -> Result<(), EconomyError> {
        if block.previous_hash != self.last_block().hash {
            return Err(EconomyError::StaleBlock);
        }
        if !block.is_valid(self.difficulty) {
            return Err(EconomyError::InvalidBlock(
                "hash does not match content or difficulty target".into(),
            ));
        }

        let included: HashSet<String> =
            block.transactions.iter().map(|t| t.id.clone()).collect();
        let before = self.pending.len();
        self.pending.retain(|t| !included.contains(&t.id));
        debug!(
            "POOL - drained {} of {} pending into block #{}",
            before - self.pending.len(),
            before,
            self.chain.len()
        );
        self.chain.push(block);
        Ok(())
    }

    /// Confirmed balance of `address`: replay the entire chain, summing
    /// incoming minus outgoing amounts. Pure function of chain state with no
    /// cache, so the result is identical regardless of call order or count.
    /// Pending transactions are invisible here until mined.
    pub fn balance_of(&self, address: &str) -> i128 {
        let mut balance: i128 = 0;
        for block in &self.chain {
            for tx in &block.transactions {
                if tx.to == address {
                    balance += tx.amount as i128;
                }
                if tx.from.as_deref() == Some(address) {
                    balance -= tx.amount as i128;
                }
            }
        }
        balance
    }

    /// Sum of pending (unconfirmed) outgoing amounts for `address`.
    pub fn pending_outgoing(&self, address: &str) -> u128 {
        self.pending
            .iter()
            .filter(|t| t.from.as_deref() == Some(address))
            .map(|t| t.amount as u128)
            .sum()
    }

    /// Validate the entire chain: linkage, hashes and PoW. Mutating any
    /// historical block's fields breaks this check.
    pub fn is_valid_chain(&self) -> bool {
        if self.chain.is_empty() {
            return false;
        }

        // Validate genesis block immutability
        let genesis = &self.chain[0];
        if genesis.previous_hash != "0" || genesis.hash != genesis.compute_hash() {
            return false;
        }

        // Validate the rest of the chain
        for i in 1..self.chain.len() {
            let current = &self.chain[i];
            let prev = &self.chain[i - 1];

            // Check linkage
            if current.previous_hash != prev.hash {
                return false;
            }

            // Check hash integrity + difficulty
            if !current.is_valid(self.difficulty) {
                return false;
            }
        }

        true
    }
}

/// Seal the pending pool into a new block for `miner`: snapshot the candidate
/// under a read lock, run the nonce search with no lock held, then append
/// under the write lock. Returns `StaleBlock` when another miner won the race
/// for this pool generation; the caller discards the result and re-draws
/// against the post-append pool.
pub fn mine_pending(ledger: &RwLock<Ledger>, miner: &str) -> Result<(), EconomyError> {
    let (mut block, difficulty) = {
        let lg = ledger.read().expect("lock poisoned");
        (lg.candidate_block(miner), lg.difficulty())
    };

    block.mine(difficulty); // CPU-bound, runs outside any lock

    let hash = block.hash.clone();
    let nonce = block.nonce;
    let tx_count = block.transactions.len();

    let mut lg = ledger.write().expect("lock poisoned");
    lg.try_append(block)?;
    info!(
        "MINER - sealed block #{} (hash={}, nonce={}, txs={})",
        lg.len() - 1,
        hash,
        nonce,
        tx_count
    );
    Ok(())
}
