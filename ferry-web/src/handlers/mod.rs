pub mod chunks;
pub mod tracker;

pub use chunks::download_chunk;
pub use tracker::{
    get_files, get_peers, query_file_parts, register_peer, remove_peer, retract_file_parts,
    update_file_parts,
};
