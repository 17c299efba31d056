pub mod analyser;
pub mod compressor;
pub mod convolver;
pub mod gain;
pub mod panner;
pub mod peaking;
pub mod split;
