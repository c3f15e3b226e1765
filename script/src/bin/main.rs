//! Command line driver for the bridge verification core.
//!
//! Every subcommand loads the state snapshot, runs one core operation and
//! writes the snapshot back when the operation changed it. The snapshot is
//! guarded by an advisory lock on `<state>.lock` for the whole cycle:
//! ```shell
//! RUST_LOG=info cargo run --release -- register --chain-id 0xaa --genesis 0x.. --validators 0x..,0x..
//! RUST_LOG=info cargo run --release -- submit-header --chain-id 0xaa 0xf90218..
//! ```

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use bridge_lib::{
    index_key, verify_proof, Address, BlockHeader, BridgeState, ChainId, ConsensusParams,
    InclusionProof, StateSnapshot, Trie, TriggerProof, ValidatorSet, H256,
};
use clap::{Parser, Subcommand};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, subscriber::set_global_default};
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Logging level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
    /// Bridge state snapshot
    #[arg(long, env = "BRIDGE_STATE", default_value = "bridge-state.bin", global = true)]
    state: PathBuf,
}

#[derive(Subcommand, Clone, Debug)]
enum Commands {
    /// Print the root of the trie over the given items, keyed by position
    TrieRoot {
        /// Hex encoded items
        items: Vec<String>,
    },
    /// Write an inclusion proof for one item to a JSON file
    Prove {
        #[arg(long)]
        index: usize,
        /// Output file, stdout if omitted
        #[arg(long)]
        output: Option<PathBuf>,
        /// Hex encoded items
        items: Vec<String>,
    },
    /// Check a proof file written by `prove`
    VerifyProof {
        #[arg(long)]
        proof: PathBuf,
    },
    /// Register a foreign chain
    Register {
        #[arg(long)]
        chain_id: String,
        #[arg(long)]
        genesis: String,
        /// Comma separated validator addresses
        #[arg(long, value_delimiter = ',', required = true)]
        validators: Vec<String>,
        #[arg(long, env = "BRIDGE_VANITY_LEN", default_value_t = ConsensusParams::CLIQUE.vanity_len)]
        vanity_len: usize,
        #[arg(long, env = "BRIDGE_SEAL_LEN", default_value_t = ConsensusParams::CLIQUE.seal_len)]
        seal_len: usize,
    },
    /// Submit an RLP encoded sealed header
    SubmitHeader {
        #[arg(long)]
        chain_id: String,
        header: String,
    },
    /// Print the transaction and receipt roots of an accepted header
    Roots {
        #[arg(long)]
        chain_id: String,
        block_hash: String,
    },
    /// Verify a trigger proof file and consume its event
    Trigger {
        #[arg(long)]
        proof: PathBuf,
    },
    /// Summarize the stored state
    ShowState,
}

/// Inclusion proof as exchanged on disk, all fields hex encoded
#[derive(Debug, Serialize, Deserialize)]
struct ProofFile {
    root: String,
    key: String,
    value: String,
    nodes: Vec<String>,
}

/// Trigger input as exchanged on disk, all fields hex encoded
#[derive(Debug, Serialize, Deserialize)]
struct TriggerFile {
    chain_id: String,
    block_hash: String,
    event_key: String,
    tx_bytes: String,
    tx_proof: Vec<String>,
    receipt_bytes: String,
    receipt_proof: Vec<String>,
    expected_emitter: String,
    /// Event signature hash, the first topic of the emitter's log
    expected_topic: String,
    /// Exact log data, usually the ABI encoded caller
    expected_data: String,
}

fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber_builder =
        tracing_subscriber::fmt::Subscriber::builder().with_env_filter(env_filter);

    let subscriber = subscriber_builder.with_writer(std::io::stderr).finish();
    set_global_default(subscriber).expect("Failed to set subscriber");
}

fn parse_hex(value: &str) -> anyhow::Result<Vec<u8>> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).with_context(|| format!("invalid hex {value:?}"))
}

fn parse_fixed<const N: usize>(value: &str) -> anyhow::Result<[u8; N]> {
    let bytes = parse_hex(value)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected {N} bytes, got {len} in {value:?}"))
}

/// Chain ids may be given short; they are left padded to 32 bytes
fn parse_chain_id(value: &str) -> anyhow::Result<ChainId> {
    let bytes = parse_hex(value)?;
    if bytes.len() > 32 {
        bail!("chain id {value:?} longer than 32 bytes");
    }
    let mut id = [0u8; 32];
    id[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(id)
}

fn parse_nodes(nodes: &[String]) -> anyhow::Result<InclusionProof> {
    let nodes = nodes
        .iter()
        .map(|node| parse_hex(node))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(InclusionProof::new(nodes))
}

fn hex_nodes(proof: &InclusionProof) -> Vec<String> {
    proof.nodes.iter().map(|node| format!("0x{}", hex::encode(node))).collect()
}

fn build_trie(items: &[String]) -> anyhow::Result<Trie> {
    let items = items
        .iter()
        .map(|item| parse_hex(item))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Trie::build(&items))
}

/// `<path><suffix>`, next to the snapshot
fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Locks the snapshot until the returned file is dropped
fn lock_state(path: &Path, exclusive: bool) -> anyhow::Result<File> {
    let lock_path = sidecar(path, ".lock");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("opening {}", lock_path.display()))?;
    let locked = if exclusive {
        file.lock_exclusive()
    } else {
        file.lock_shared()
    };
    locked.with_context(|| format!("locking {}", lock_path.display()))?;
    debug!(path = %lock_path.display(), exclusive, "state locked");
    Ok(file)
}

fn load_state(path: &Path) -> anyhow::Result<BridgeState> {
    if !path.exists() {
        debug!(path = %path.display(), "no snapshot yet, starting empty");
        return Ok(BridgeState::new());
    }
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let snapshot = StateSnapshot::from_bytes(&bytes)?;
    Ok(BridgeState::import_state(snapshot)?)
}

fn save_state(path: &Path, state: &BridgeState) -> anyhow::Result<()> {
    let bytes = state.export_state().to_bytes()?;
    // readers never see a partially written snapshot
    let tmp = sidecar(path, ".tmp");
    let mut file = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    file.write_all(&bytes)
        .with_context(|| format!("writing {}", tmp.display()))?;
    file.sync_all()?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    debug!(path = %path.display(), "saved snapshot");
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::TrieRoot { items } => {
            let trie = build_trie(&items)?;
            println!("0x{}", hex::encode(trie.root()));
        }
        Commands::Prove {
            index,
            output,
            items,
        } => {
            let trie = build_trie(&items)?;
            let key = index_key(index);
            let value = trie
                .get(&key)
                .with_context(|| format!("no item at index {index}"))?;
            let proof = trie.prove(&key)?;
            let file = ProofFile {
                root: format!("0x{}", hex::encode(trie.root())),
                key: format!("0x{}", hex::encode(&key)),
                value: format!("0x{}", hex::encode(value)),
                nodes: hex_nodes(&proof),
            };
            let json = serde_json::to_string_pretty(&file)?;
            match output {
                Some(path) => {
                    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?
                }
                None => println!("{json}"),
            }
        }
        Commands::VerifyProof { proof } => {
            let json = fs::read_to_string(&proof)
                .with_context(|| format!("reading {}", proof.display()))?;
            let file: ProofFile = serde_json::from_str(&json)?;
            let root: H256 = parse_fixed(&file.root)?;
            let key = parse_hex(&file.key)?;
            let value = verify_proof(&root, &key, &parse_nodes(&file.nodes)?)?;
            if value != parse_hex(&file.value)? {
                bail!("proof holds 0x{}, file claims {}", hex::encode(&value), file.value);
            }
            println!("verified 0x{}", hex::encode(value));
        }
        Commands::Register {
            chain_id,
            genesis,
            validators,
            vanity_len,
            seal_len,
        } => {
            let _lock = lock_state(&cli.state, true)?;
            let state = load_state(&cli.state)?;
            let validators = validators
                .iter()
                .map(|v| parse_fixed::<20>(v))
                .collect::<anyhow::Result<Vec<Address>>>()?;
            state.register_with_params(
                parse_chain_id(&chain_id)?,
                ValidatorSet::new(validators)?,
                parse_fixed(&genesis)?,
                ConsensusParams {
                    vanity_len,
                    seal_len,
                },
            )?;
            save_state(&cli.state, &state)?;
        }
        Commands::SubmitHeader { chain_id, header } => {
            let _lock = lock_state(&cli.state, true)?;
            let state = load_state(&cli.state)?;
            let header = BlockHeader::from_rlp(&parse_hex(&header)?)?;
            let accepted = state.submit_header(parse_chain_id(&chain_id)?, &header)?;
            save_state(&cli.state, &state)?;
            println!("{}", serde_json::to_string_pretty(&accepted)?);
        }
        Commands::Roots {
            chain_id,
            block_hash,
        } => {
            let _lock = lock_state(&cli.state, false)?;
            let state = load_state(&cli.state)?;
            let (tx_root, receipt_root) =
                state.roots_for(parse_chain_id(&chain_id)?, parse_fixed(&block_hash)?)?;
            println!("transactions_root 0x{}", hex::encode(tx_root));
            println!("receipts_root     0x{}", hex::encode(receipt_root));
        }
        Commands::Trigger { proof } => {
            let json = fs::read_to_string(&proof)
                .with_context(|| format!("reading {}", proof.display()))?;
            let file: TriggerFile = serde_json::from_str(&json)?;
            let proof = TriggerProof {
                chain_id: parse_chain_id(&file.chain_id)?,
                block_hash: parse_fixed(&file.block_hash)?,
                event_key: parse_hex(&file.event_key)?,
                tx_bytes: parse_hex(&file.tx_bytes)?,
                tx_proof: parse_nodes(&file.tx_proof)?,
                receipt_bytes: parse_hex(&file.receipt_bytes)?,
                receipt_proof: parse_nodes(&file.receipt_proof)?,
                expected_emitter: parse_fixed(&file.expected_emitter)?,
                expected_topic: parse_fixed(&file.expected_topic)?,
                expected_data: parse_hex(&file.expected_data)?,
            };

            let _lock = lock_state(&cli.state, true)?;
            let state = load_state(&cli.state)?;
            let token = state.verify_and_authorize(&proof)?;
            save_state(&cli.state, &state)?;
            println!("event_id 0x{}", hex::encode(token.event_id));
            println!("abi      0x{}", hex::encode(token.abi_encode()));
        }
        Commands::ShowState => {
            let _lock = lock_state(&cli.state, false)?;
            let snapshot = load_state(&cli.state)?.export_state();
            for chain in &snapshot.chains {
                let head = chain
                    .latest()
                    .map(|header| format!("#{} 0x{}", header.number, hex::encode(header.block_hash)))
                    .unwrap_or_else(|| "genesis".to_string());
                println!(
                    "chain 0x{}: {} validators, {} accepted headers, head {}",
                    hex::encode(chain.chain_id),
                    chain.validators.len(),
                    chain.accepted.len(),
                    head
                );
                for validator in chain.validators.as_slice() {
                    println!("  validator 0x{}", hex::encode(validator));
                }
            }
            println!("{} executed events", snapshot.executions.len());
        }
    }
    Ok(())
}

fn main() {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli) {
        Ok(()) => info!("bridge command finished"),
        Err(err) => {
            error!("bridge command failed: {err:#}");
            std::process::exit(1);
        }
    }
}
