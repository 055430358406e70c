pub mod tcp_demuxer;
pub mod tcp_muxer;
