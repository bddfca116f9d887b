mod packet_stream;
